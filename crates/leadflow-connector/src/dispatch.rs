// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Qualification of completed conversations and one-shot structured leads.
//!
//! A scorer failure never leaves a lead unscored: the fallback score and note
//! are applied instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadflow_config::model::ScorerConfig;
use leadflow_core::types::config_keys;
use leadflow_core::{
    ContactFields, InstanceId, Lead, LeadNotifier, LeadStatus, LeadStore, LeadflowError, NewLead,
    Qualification, Scorer, TenantId,
};

use crate::buffer::CompletedConversation;
use crate::lifecycle::ConnectionManager;
use crate::metrics;
use crate::tasks::BackgroundTasks;
use crate::welcome::welcome_for;

pub const FALLBACK_SCORE: i64 = 50;
pub const SCORER_FALLBACK_NOTE: &str = "AI connection or analysis error - default score";
pub const RESTART_FALLBACK_NOTE: &str =
    "Conversation interrupted by a service restart - default score";

/// Criteria used when a tenant has none configured.
pub const DEFAULT_CRITERIA: &str = "Analyze the lead. If it has a full name, email and phone, \
     add 50 points. If the email looks corporate, add 20 points. If it states explicit \
     interest, add 30 points.";

/// Source label when neither the request nor the body names one.
pub const DEFAULT_SOURCE: &str = "Webhook";

/// Name stored for a structured lead submitted without one.
pub const UNKNOWN_NAME: &str = "Unknown";

fn fallback() -> Qualification {
    Qualification {
        score: FALLBACK_SCORE,
        reason: SCORER_FALLBACK_NOTE.to_string(),
    }
}

/// Upper bound on one scoring call: the HTTP timeout for both attempts plus the
/// retry pause.
pub fn scoring_deadline(config: &ScorerConfig) -> Duration {
    Duration::from_secs(config.timeout_secs * 2 + 1)
}

pub struct Dispatcher {
    store: Arc<dyn LeadStore>,
    scorer: Arc<dyn Scorer>,
    notifier: Arc<dyn LeadNotifier>,
    connections: Arc<ConnectionManager>,
    tasks: BackgroundTasks,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn LeadStore>,
        scorer: Arc<dyn Scorer>,
        notifier: Arc<dyn LeadNotifier>,
        connections: Arc<ConnectionManager>,
        tasks: BackgroundTasks,
        deadline: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            scorer,
            notifier,
            connections,
            tasks,
            deadline,
        })
    }

    /// Consume completed conversations until cancelled or the queue closes.
    ///
    /// Each conversation is qualified on its own background task.
    pub async fn run(
        self: Arc<Self>,
        mut completed: mpsc::UnboundedReceiver<CompletedConversation>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = completed.recv() => match next {
                    Some(conversation) => {
                        let this = self.clone();
                        self.tasks.spawn("qualify", async move {
                            this.qualify_conversation(conversation).await
                        });
                    }
                    None => break,
                },
            }
        }
        debug!("qualification loop stopped");
    }

    /// Score a flushed chat conversation and finalize its lead.
    pub async fn qualify_conversation(
        &self,
        conversation: CompletedConversation,
    ) -> Result<(), LeadflowError> {
        let lead_id = conversation.lead_id;
        if self.store.get_lead(lead_id).await?.is_none() {
            info!(lead_id = %lead_id, "lead deleted while buffering, skipping qualification");
            return Ok(());
        }

        let criteria = self.chat_criteria(&conversation.tenant_id).await?;
        let payload = serde_json::json!({
            "name": conversation.push_name,
            "phone": conversation.contact.0,
            "conversation": conversation.conversation_text(),
        });
        let qualification = self.score(&payload, &criteria).await;

        let Some(lead) = self
            .store
            .finalize_lead(lead_id, &qualification, &payload.to_string())
            .await?
        else {
            info!(lead_id = %lead_id, "lead deleted while scoring");
            return Ok(());
        };
        info!(
            tenant_id = %lead.tenant_id,
            lead_id = %lead.id,
            score = lead.score,
            messages = conversation.messages.len(),
            "conversation qualified"
        );
        self.notify(&lead).await;
        Ok(())
    }

    /// Score and store a one-shot lead (ingress gateway, manual entry).
    ///
    /// `raw_payload` is everything the caller submitted and is what gets
    /// scored. A welcome message goes out when the lead has a phone and an
    /// instance is given.
    pub async fn ingest_structured(
        &self,
        tenant_id: &TenantId,
        mut fields: ContactFields,
        source: &str,
        raw_payload: serde_json::Value,
        instance_id: Option<InstanceId>,
    ) -> Result<Lead, LeadflowError> {
        if fields.name.trim().is_empty() {
            fields.name = UNKNOWN_NAME.to_string();
        }
        let criteria = self.general_criteria(tenant_id).await?;
        let qualification = self.score(&raw_payload, &criteria).await;

        let lead = self
            .store
            .create_lead(&NewLead {
                tenant_id: tenant_id.clone(),
                instance_id: instance_id.clone(),
                source: source.to_string(),
                fields,
                raw_payload: raw_payload.to_string(),
                score: qualification.score,
                reasoning: qualification.reason,
                status: LeadStatus::New,
            })
            .await?;
        metrics::record_lead_created(source);
        info!(
            tenant_id = %tenant_id,
            lead_id = %lead.id,
            source = %source,
            score = lead.score,
            "lead ingested"
        );

        self.notify(&lead).await;

        if let (Some(phone), Some(instance_id)) = (lead.phone.clone(), instance_id) {
            let store = self.store.clone();
            let connections = self.connections.clone();
            let tenant_id = tenant_id.clone();
            let name = lead.name.clone();
            self.tasks.spawn("welcome", async move {
                if let Some(text) = welcome_for(store.as_ref(), &tenant_id, &name).await? {
                    connections.send_text(&instance_id, &phone, &text).await?;
                    debug!(instance_id = %instance_id, "welcome message sent");
                }
                Ok(())
            });
        }
        Ok(lead)
    }

    /// Scorer result clamped to `0..=100`, or the fallback on error or timeout.
    async fn score(&self, payload: &serde_json::Value, criteria: &str) -> Qualification {
        match tokio::time::timeout(self.deadline, self.scorer.score(payload, criteria)).await {
            Ok(Ok(q)) => Qualification {
                score: q.score.clamp(0, 100),
                reason: q.reason,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "scoring failed, using fallback score");
                metrics::record_scorer_fallback();
                fallback()
            }
            Err(_) => {
                warn!(deadline_secs = self.deadline.as_secs(), "scoring timed out, using fallback score");
                metrics::record_scorer_fallback();
                fallback()
            }
        }
    }

    /// Chat prompt if set and non-blank, else the general prompt, else the default.
    async fn chat_criteria(&self, tenant_id: &TenantId) -> Result<String, LeadflowError> {
        let chat = self
            .store
            .get_config(tenant_id, config_keys::CHAT_SCORING_PROMPT)
            .await?;
        if let Some(chat) = chat.filter(|p| !p.trim().is_empty()) {
            return Ok(chat);
        }
        let general = self
            .store
            .get_config(tenant_id, config_keys::SCORING_PROMPT)
            .await?;
        Ok(general
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CRITERIA.to_string()))
    }

    /// The tenant's general prompt, storing the default on first use.
    async fn general_criteria(&self, tenant_id: &TenantId) -> Result<String, LeadflowError> {
        if let Some(prompt) = self
            .store
            .get_config(tenant_id, config_keys::SCORING_PROMPT)
            .await?
        {
            return Ok(non_empty_or_default(prompt));
        }
        if self
            .store
            .insert_config_if_absent(tenant_id, config_keys::SCORING_PROMPT, DEFAULT_CRITERIA)
            .await?
        {
            debug!(tenant_id = %tenant_id, "stored default scoring prompt");
            return Ok(DEFAULT_CRITERIA.to_string());
        }
        // Lost a race with another writer; use theirs.
        let prompt = self
            .store
            .get_config(tenant_id, config_keys::SCORING_PROMPT)
            .await?
            .unwrap_or_default();
        Ok(non_empty_or_default(prompt))
    }

    /// POST the lead to the tenant's outbound URL, if one is configured.
    async fn notify(&self, lead: &Lead) {
        let url = match self
            .store
            .get_config(&lead.tenant_id, config_keys::OUTBOUND_WEBHOOK_URL)
            .await
        {
            Ok(url) => url.filter(|u| !u.trim().is_empty()),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "failed to read webhook url");
                None
            }
        };
        let Some(url) = url else {
            return;
        };
        let notifier = self.notifier.clone();
        let lead = lead.clone();
        self.tasks.spawn("webhook", async move {
            notifier.notify(url.trim(), &lead).await
        });
    }
}

fn non_empty_or_default(prompt: String) -> String {
    if prompt.is_empty() {
        DEFAULT_CRITERIA.to_string()
    } else {
        prompt
    }
}
