// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock outbound webhook notifier.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use leadflow_core::{AdapterType, HealthStatus, Lead, LeadNotifier, LeadflowError, PluginAdapter};

/// Records every `(url, lead)` delivery.
#[derive(Default)]
pub struct MockNotifier {
    delivered: Mutex<Vec<(String, Lead)>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn delivered(&self) -> Vec<(String, Lead)> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockNotifier {
    fn name(&self) -> &str {
        "mock-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadflowError> {
        Ok(())
    }
}

#[async_trait]
impl LeadNotifier for MockNotifier {
    async fn notify(&self, url: &str, lead: &Lead) -> Result<(), LeadflowError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadflowError::Webhook {
                message: "mock webhook failure".into(),
                source: None,
            });
        }
        self.delivered
            .lock()
            .await
            .push((url.to_string(), lead.clone()));
        Ok(())
    }
}
