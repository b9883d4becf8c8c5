// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Welcome message templating.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use leadflow_core::types::config_keys;
use leadflow_core::{LeadStore, LeadflowError, TenantId};

static NAME_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{name\}").expect("valid placeholder pattern"));

/// Render a welcome template. An empty or blank template disables the message.
pub fn render_welcome(template: &str, name: &str) -> Option<String> {
    if template.trim().is_empty() {
        return None;
    }
    Some(
        NAME_PLACEHOLDER
            .replace_all(template, NoExpand(name))
            .into_owned(),
    )
}

/// The tenant's rendered welcome message for `name`, if one is configured.
pub async fn welcome_for(
    store: &dyn LeadStore,
    tenant_id: &TenantId,
    name: &str,
) -> Result<Option<String>, LeadflowError> {
    let template = store
        .get_config(tenant_id, config_keys::WELCOME_MESSAGE)
        .await?
        .unwrap_or_default();
    Ok(render_welcome(&template, name))
}
