// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound webhook delivery of finalized leads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use leadflow_config::model::WebhookConfig;
use leadflow_core::{AdapterType, HealthStatus, Lead, LeadNotifier, LeadflowError, PluginAdapter};

fn webhook_error(message: String, source: Option<reqwest::Error>) -> LeadflowError {
    LeadflowError::Webhook {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

/// POSTs the lead as JSON to the tenant's URL. Not retried.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, LeadflowError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| webhook_error(format!("failed to build HTTP client: {e}"), Some(e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PluginAdapter for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
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
impl LeadNotifier for WebhookNotifier {
    async fn notify(&self, url: &str, lead: &Lead) -> Result<(), LeadflowError> {
        let response = self
            .client
            .post(url)
            .json(lead)
            .send()
            .await
            .map_err(|e| webhook_error(format!("delivery to {url} failed: {e}"), Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(webhook_error(format!("{url} answered {status}"), None));
        }
        debug!(lead_id = %lead.id, status = %status, "lead delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::{LeadId, LeadStatus, TenantId};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lead() -> Lead {
        Lead {
            id: LeadId(7),
            tenant_id: TenantId("acme".into()),
            instance_id: None,
            source: "Webhook".into(),
            name: "Ana".into(),
            email: Some("ana@acme.io".into()),
            phone: None,
            company: None,
            role: None,
            address: None,
            city: None,
            raw_payload: "{}".into(),
            score: 80,
            reasoning: "fit".into(),
            status: LeadStatus::New,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn posts_lead_as_camel_case_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "id": 7, "tenantId": "acme", "score": 80, "status": "New"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&WebhookConfig::default()).unwrap();
        notifier
            .notify(&format!("{}/hook", server.uri()), &lead())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&WebhookConfig::default()).unwrap();
        let err = notifier.notify(&server.uri(), &lead()).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Webhook { .. }));
    }
}
