// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead scorer backed by the Anthropic Messages API.
//!
//! The model receives the tenant's qualification criteria as the system
//! prompt and the lead payload as the only user message, and must answer
//! with a single JSON object `{"score": 0-100, "reason": "..."}`.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use leadflow_config::model::ScorerConfig;
use leadflow_core::{
    AdapterType, HealthStatus, LeadflowError, PluginAdapter, Qualification, Scorer,
};
use tracing::debug;

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

/// Scores leads through the Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicScorer {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
}

impl AnthropicScorer {
    /// Creates a scorer from config, falling back to `ANTHROPIC_API_KEY`.
    pub fn new(config: &ScorerConfig) -> Result<Self, LeadflowError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| {
                LeadflowError::Config(format!(
                    "no scorer API key: set scorer.api_key or {API_KEY_ENV_VAR}"
                ))
            })?;

        let client = AnthropicClient::new(
            &api_key,
            &config.api_version,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Replaces the HTTP client, e.g. to shorten retry delays in tests.
    pub fn with_client(mut self, client: AnthropicClient) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl PluginAdapter for AnthropicScorer {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Scorer
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadflowError> {
        Ok(())
    }
}

#[async_trait]
impl Scorer for AnthropicScorer {
    async fn score(
        &self,
        payload: &serde_json::Value,
        criteria: &str,
    ) -> Result<Qualification, LeadflowError> {
        let request = MessageRequest {
            model: self.model.clone(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: payload.to_string(),
            }],
            system: Some(system_prompt(criteria)),
            max_tokens: self.max_tokens,
        };

        let response = self.client.complete_message(&request).await?;
        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "lead scored"
        );
        parse_qualification(&response.text())
    }
}

/// Builds the system prompt around the tenant's criteria.
pub fn system_prompt(criteria: &str) -> String {
    format!(
        "You are an expert lead qualification analyst. Evaluate the lead data \
         provided by the user against the following qualification criteria.\n\n\
         Qualification criteria:\n{criteria}\n\n\
         Respond ONLY with a JSON object of the form \
         {{\"score\": <integer from 0 to 100>, \"reason\": \"<short justification>\"}}. \
         Do not include any other text."
    )
}

/// Extracts the qualification object from model output.
///
/// Tolerates prose or code fences around the object. Fractional scores are
/// rounded and out-of-range scores clamped to `0..=100`.
pub fn parse_qualification(text: &str) -> Result<Qualification, LeadflowError> {
    let object = first_json_object(text).ok_or_else(|| LeadflowError::Scorer {
        message: format!("no JSON object in model output: {text}"),
        source: None,
    })?;

    let value: serde_json::Value =
        serde_json::from_str(object).map_err(|e| LeadflowError::Scorer {
            message: format!("malformed JSON in model output: {e}"),
            source: Some(Box::new(e)),
        })?;

    let score = match &value["score"] {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| LeadflowError::Scorer {
        message: format!("model output has no numeric score: {object}"),
        source: None,
    })?;

    let reason = value["reason"]
        .as_str()
        .map(str::to_owned)
        .unwrap_or_default();

    Ok(Qualification {
        score: (score.round() as i64).clamp(0, 100),
        reason,
    })
}

/// Returns the first balanced `{...}` span, skipping braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
