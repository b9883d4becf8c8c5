// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock scorer with scripted results.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use leadflow_core::{AdapterType, HealthStatus, LeadflowError, PluginAdapter, Qualification, Scorer};

/// A scorer that returns queued results, then a fixed default.
pub struct MockScorer {
    queued: Mutex<VecDeque<Result<Qualification, String>>>,
    default: Result<Qualification, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(serde_json::Value, String)>>,
}

impl MockScorer {
    /// Always answers with `score` and `reason`.
    pub fn new(score: i64, reason: &str) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default: Ok(Qualification {
                score,
                reason: reason.to_string(),
            }),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self {
            default: Err("mock scorer unavailable".to_string()),
            ..Self::new(0, "")
        }
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a one-off result ahead of the default.
    pub async fn push_result(&self, result: Result<Qualification, String>) {
        self.queued.lock().await.push_back(result);
    }

    /// Every `(payload, criteria)` pair the scorer received.
    pub async fn calls(&self) -> Vec<(serde_json::Value, String)> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockScorer {
    fn name(&self) -> &str {
        "mock-scorer"
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
impl Scorer for MockScorer {
    async fn score(
        &self,
        payload: &serde_json::Value,
        criteria: &str,
    ) -> Result<Qualification, LeadflowError> {
        self.calls
            .lock()
            .await
            .push((payload.clone(), criteria.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queued.lock().await.pop_front();
        next.unwrap_or_else(|| self.default.clone())
            .map_err(|message| LeadflowError::Scorer {
                message,
                source: None,
            })
    }
}
