// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: transport events in, qualified leads out.
//!
//! Every test runs on a paused clock with mock adapters and its own temp
//! SQLite store.

mod common;

use std::time::Duration;

use common::{Harness, inst};
use leadflow_connector::dispatch::{
    DEFAULT_SOURCE, FALLBACK_SCORE, RESTART_FALLBACK_NOTE, SCORER_FALLBACK_NOTE,
};
use leadflow_core::traits::credentials::SESSION_KEY;
use leadflow_core::types::config_keys;
use leadflow_core::{
    ContactFields, ContactId, CredentialStore, LeadStatus, LeadStore, NewLead, RawInbound,
};
use leadflow_test_utils::{MockScorer, TestStore, eventually, raw_text};

async fn wait_for_buffered(h: &Harness, phone: &str, count: usize) -> bool {
    let aggregator = h.runtime.aggregator();
    let contact = ContactId(phone.into());
    let contact = &contact;
    eventually(|| async move {
        aggregator
            .snapshot(&TestStore::tenant_id(), contact)
            .is_some_and(|s| s.lead_id.is_some() && s.messages.len() == count)
    })
    .await
}

// ---- Test 1: Conversation to qualified lead ----

#[tokio::test(start_paused = true)]
async fn test_conversation_becomes_qualified_lead() {
    let h = Harness::new(MockScorer::new(82, "asked for pricing")).await;
    h.ts.set_config(config_keys::WELCOME_MESSAGE, "Hello {name}, thanks for reaching out")
        .await
        .unwrap();
    h.ts.set_config(config_keys::BUFFER_TIMEOUT_MINUTES, "1").await.unwrap();
    h.connect_and_open().await;

    assert!(h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi")).await);
    let pending = h.wait_for_lead(LeadStatus::Pending).await;
    assert_eq!(pending.source, "Chat");
    assert_eq!(pending.name, "Ana");
    assert_eq!(pending.phone.as_deref(), Some("100"));
    assert_eq!(pending.instance_id, Some(inst()));

    let session = h.connector.latest_session(&inst()).await.unwrap();
    let s = &session;
    assert!(eventually(|| async move { !s.sent_messages().await.is_empty() }).await);
    assert_eq!(
        session.sent_messages().await,
        vec![(
            "100@s.whatsapp.net".to_string(),
            "Hello Ana, thanks for reaching out".to_string()
        )]
    );

    h.connector
        .emit_message(&inst(), raw_text("100", "Ana", "I want pricing for 10 units"))
        .await;
    assert!(wait_for_buffered(&h, "100", 1).await);
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.connector
        .emit_message(&inst(), raw_text("100", "Ana", "call me at 3pm"))
        .await;
    assert!(wait_for_buffered(&h, "100", 2).await);

    // Quiet period restarts at 30s, so nothing is scored before 90s.
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(h.scorer.call_count().await, 0);
    assert_eq!(h.leads().await[0].status, LeadStatus::Pending);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let lead = h.wait_for_lead(LeadStatus::New).await;
    assert_eq!(lead.id, pending.id);
    assert_eq!(lead.score, 82);
    assert_eq!(lead.reasoning, "asked for pricing");

    let calls = h.scorer.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0["conversation"],
        "I want pricing for 10 units\ncall me at 3pm"
    );
    assert_eq!(calls[0].0["phone"], "100");
    assert_eq!(h.runtime.aggregator().buffer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scorer_failure_yields_fallback_score() {
    let h = Harness::new(MockScorer::failing()).await;
    h.connect_and_open().await;

    h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi")).await;
    h.wait_for_lead(LeadStatus::Pending).await;
    h.connector
        .emit_message(&inst(), raw_text("100", "Ana", "interested"))
        .await;
    assert!(wait_for_buffered(&h, "100", 1).await);

    tokio::time::sleep(Duration::from_secs(121)).await;
    let lead = h.wait_for_lead(LeadStatus::New).await;
    assert_eq!(lead.score, FALLBACK_SCORE);
    assert_eq!(lead.reasoning, SCORER_FALLBACK_NOTE);
}

#[tokio::test(start_paused = true)]
async fn test_qualified_lead_is_posted_to_webhook() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.ts.set_config(config_keys::OUTBOUND_WEBHOOK_URL, "https://crm.example/hook")
        .await
        .unwrap();
    h.connect_and_open().await;

    h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi")).await;
    h.wait_for_lead(LeadStatus::Pending).await;
    h.connector
        .emit_message(&inst(), raw_text("100", "Ana", "quote please"))
        .await;
    assert!(wait_for_buffered(&h, "100", 1).await);
    tokio::time::sleep(Duration::from_secs(121)).await;
    h.wait_for_lead(LeadStatus::New).await;

    let notifier = &h.notifier;
    assert!(eventually(|| async move { notifier.delivered().await.len() == 1 }).await);
    let (url, lead) = h.notifier.delivered().await.remove(0);
    assert_eq!(url, "https://crm.example/hook");
    assert_eq!(lead.score, 60);
}

// ---- Test 2: Inbound filtering ----

#[tokio::test(start_paused = true)]
async fn test_own_and_group_messages_are_ignored() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.connect_and_open().await;

    let own = RawInbound {
        from_me: true,
        ..raw_text("100", "Ana", "sent by us")
    };
    let group = RawInbound {
        remote_jid: Some("120363@g.us".into()),
        ..raw_text("100", "Ana", "group chatter")
    };
    let self_chat = raw_text("5511000", "Me", "note to self");
    for raw in [own, group, self_chat] {
        h.connector.emit_message(&inst(), raw).await;
    }
    // A real message afterwards proves the pump processed the earlier ones.
    h.connector.emit_message(&inst(), raw_text("200", "Bo", "hello")).await;
    let lead = h.wait_for_lead(LeadStatus::Pending).await;
    assert_eq!(lead.phone.as_deref(), Some("200"));
    assert_eq!(h.runtime.aggregator().buffer_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_known_contact_does_not_open_buffer() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.ts.store
        .create_lead(&NewLead {
            tenant_id: TestStore::tenant_id(),
            instance_id: None,
            source: DEFAULT_SOURCE.into(),
            fields: ContactFields {
                name: "Ana".into(),
                phone: Some("100".into()),
                ..Default::default()
            },
            raw_payload: "{}".into(),
            score: 40,
            reasoning: "form".into(),
            status: LeadStatus::New,
        })
        .await
        .unwrap();
    h.connect_and_open().await;

    h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi again")).await;
    h.connector.emit_message(&inst(), raw_text("300", "Cy", "hello")).await;
    let store = &h.ts.store;
    assert!(
        eventually(|| async move {
            store
                .list_leads(&TestStore::tenant_id())
                .await
                .is_ok_and(|l| l.len() == 2)
        })
        .await
    );
    let aggregator = h.runtime.aggregator();
    assert!(eventually(|| async move { aggregator.buffer_count() == 1 }).await);
    assert!(
        h.runtime
            .aggregator()
            .snapshot(&TestStore::tenant_id(), &ContactId("100".into()))
            .is_none()
    );
}

// ---- Test 3: Startup reconciliation ----

fn pending_chat_lead(phone: &str) -> NewLead {
    NewLead {
        tenant_id: TestStore::tenant_id(),
        instance_id: Some(inst()),
        source: "Chat".into(),
        fields: ContactFields {
            name: "Ana".into(),
            phone: Some(phone.into()),
            ..Default::default()
        },
        raw_payload: "{}".into(),
        score: 0,
        reasoning: String::new(),
        status: LeadStatus::Pending,
    }
}

#[tokio::test(start_paused = true)]
async fn test_restart_heals_pending_leads_and_resumes_sessions() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.ts.store.create_lead(&pending_chat_lead("200")).await.unwrap();
    h.credentials
        .put(&inst(), SESSION_KEY, b"saved-session")
        .await
        .unwrap();

    h.runtime.connections().ensure_restored().await;
    h.runtime.connections().ensure_restored().await;

    let lead = h.wait_for_lead(LeadStatus::New).await;
    assert_eq!(lead.score, FALLBACK_SCORE);
    assert_eq!(lead.reasoning, RESTART_FALLBACK_NOTE);
    assert_eq!(h.scorer.call_count().await, 0);

    let connector = &h.connector;
    assert!(eventually(|| async move { connector.open_count(&inst()).await == 1 }).await);
    let creds = h.connector.last_credentials(&inst()).await.unwrap();
    assert_eq!(creds.get(SESSION_KEY).map(Vec::as_slice), Some(&b"saved-session"[..]));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_reconciliation() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.ts.store.create_lead(&pending_chat_lead("200")).await.unwrap();
    h.credentials
        .put(&inst(), SESSION_KEY, b"saved-session")
        .await
        .unwrap();

    let connections = h.runtime.connections();
    let (status_inst, send_inst) = (inst(), inst());
    let (_, _, sent) = tokio::join!(
        connections.ensure_restored(),
        connections.status(&status_inst),
        connections.send_text(&send_inst, "200", "hi"),
    );

    // Every caller returned only after the heal had committed.
    let leads = h.leads().await;
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].status, LeadStatus::New);
    assert_eq!(leads[0].reasoning, RESTART_FALLBACK_NOTE);
    assert!(sent.unwrap_err().is_not_connected());
    assert_eq!(h.credentials.listing_count(), 1);

    let connector = &h.connector;
    assert!(eventually(|| async move { connector.open_count(&inst()).await == 1 }).await);

    connections.ensure_restored().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(h.credentials.listing_count(), 1);
}

// ---- Test 4: Structured leads ----

#[tokio::test(start_paused = true)]
async fn test_structured_lead_gets_welcome_on_connected_instance() {
    let h = Harness::new(MockScorer::new(75, "complete contact")).await;
    h.ts.set_config(config_keys::WELCOME_MESSAGE, "Hi {NAME}!").await.unwrap();
    h.connect_and_open().await;

    let body = serde_json::json!({"name": "Dee", "phone": "+55 (11) 98888-7777", "utm": "ads"});
    let lead = h
        .runtime
        .dispatcher()
        .ingest_structured(
            &TestStore::tenant_id(),
            ContactFields {
                name: "Dee".into(),
                phone: Some("+55 (11) 98888-7777".into()),
                ..Default::default()
            },
            "Landing page",
            body,
            Some(inst()),
        )
        .await
        .unwrap();
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.score, 75);
    assert_eq!(lead.source, "Landing page");

    let session = h.connector.latest_session(&inst()).await.unwrap();
    let s = &session;
    assert!(eventually(|| async move { !s.sent_messages().await.is_empty() }).await);
    assert_eq!(
        session.sent_messages().await,
        vec![("5511988887777@s.whatsapp.net".to_string(), "Hi Dee!".to_string())]
    );
}

// ---- Test 5: Shutdown ----

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_sessions_without_logout() {
    let h = Harness::new(MockScorer::new(60, "ok")).await;
    h.connect_and_open().await;
    h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi")).await;
    h.wait_for_lead(LeadStatus::Pending).await;

    let session = h.connector.latest_session(&inst()).await.unwrap();
    let Harness { runtime, .. } = h;
    assert!(runtime.shutdown(Duration::from_secs(5)).await);
    assert!(session.was_closed());
    assert!(!session.was_logged_out());
}
