// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle: connect, QR, close handling, reconnects, logout.

mod common;

use std::time::Duration;

use common::{Harness, OWN_JID, inst};
use leadflow_config::model::{LeadflowConfig, ReconnectConfig};
use leadflow_core::traits::credentials::SESSION_KEY;
use leadflow_core::{
    AccountInfo, CloseReason, ConnectionState, CredentialStore, InstanceId, LeadStore,
};
use leadflow_test_utils::{MockScorer, TestStore, eventually, raw_text};

fn fast_reconnect() -> LeadflowConfig {
    LeadflowConfig {
        reconnect: ReconnectConfig {
            base_delay_ms: 50,
            jitter_ms: 0,
        },
        ..LeadflowConfig::default()
    }
}

fn dropped() -> CloseReason {
    CloseReason::Other {
        code: Some(428),
        message: "connection lost".into(),
    }
}

// ---- Test 1: Connect and status ----

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let connections = h.runtime.connections();

    connections.connect(&inst()).await.unwrap();
    connections.connect(&inst()).await.unwrap();
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(connections.status(&inst()).await, ConnectionState::Connecting);

    h.connect_and_open().await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_records_account() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connect_and_open().await;

    assert_eq!(
        h.runtime.connections().status(&inst()).await,
        ConnectionState::Connected {
            account: Some(AccountInfo {
                phone: "5511000".into(),
                name: "Acme Sales".into(),
                jid: OWN_JID.into(),
            })
        }
    );
    let store = &h.ts.store;
    assert!(
        eventually(|| async move {
            store
                .get_instance(&inst())
                .await
                .ok()
                .flatten()
                .is_some_and(|i| i.phone_number.as_deref() == Some("5511000"))
        })
        .await
    );
    let instance = h.ts.store.get_instance(&inst()).await.unwrap().unwrap();
    assert_eq!(instance.display_name_from_transport.as_deref(), Some("Acme Sales"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_unknown_instance_fails() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let missing = InstanceId("nope".into());
    let err = h.runtime.connections().connect(&missing).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert_eq!(h.connector.open_count(&missing).await, 0);
    assert_eq!(
        h.runtime.connections().status(&missing).await,
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_open_allows_retry() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connector.set_fail_open(true);
    assert!(h.runtime.connections().connect(&inst()).await.is_err());
    assert_eq!(
        h.runtime.connections().status(&inst()).await,
        ConnectionState::Disconnected
    );

    h.connector.set_fail_open(false);
    h.connect_and_open().await;
}

// ---- Test 2: QR codes ----

#[tokio::test(start_paused = true)]
async fn test_qr_is_exposed_while_scanning() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let connections = h.runtime.connections();
    connections.connect(&inst()).await.unwrap();
    assert!(h.connector.emit_qr(&inst(), "2@qr-payload").await);

    assert!(eventually(|| async move { connections.registry().qr(&inst()).is_some() }).await);
    assert_eq!(
        connections.status(&inst()).await,
        ConnectionState::Scanning {
            qr: "2@qr-payload".into()
        }
    );
    assert_eq!(
        connections.qr(&inst()).await.unwrap().as_deref(),
        Some("2@qr-payload")
    );

    h.connector.emit_open(&inst(), OWN_JID, None).await;
    assert!(eventually(|| async move { connections.registry().qr(&inst()).is_none() }).await);
}

#[tokio::test(start_paused = true)]
async fn test_qr_request_starts_session_and_times_out() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let started = tokio::time::Instant::now();
    let qr = h.runtime.connections().qr(&inst()).await.unwrap();
    assert_eq!(qr, None);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(h.connector.open_count(&inst()).await, 1);
}

// ---- Test 3: Close handling ----

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_reconnects_after_jittered_delay() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.credentials.put(&inst(), SESSION_KEY, b"s1").await.unwrap();
    h.connect_and_open().await;

    assert!(h.connector.emit_close(&inst(), dropped()).await);
    tokio::time::sleep(Duration::from_millis(2_990)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(
        h.runtime.connections().registry().state(&inst()),
        ConnectionState::Disconnected
    );

    tokio::time::sleep(Duration::from_millis(2_020)).await;
    let connector = &h.connector;
    assert!(eventually(|| async move { connector.open_count(&inst()).await == 2 }).await);
    assert!(h.credentials.get_all(&inst()).await.unwrap().contains_key(SESSION_KEY));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connect_and_open().await;

    assert!(h.connector.emit_close(&inst(), dropped()).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.runtime.connections().shutdown().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_logged_out_close_clears_credentials_without_reconnect() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.credentials.put(&inst(), SESSION_KEY, b"s1").await.unwrap();
    h.credentials.put(&inst(), "pre-key-1", b"k").await.unwrap();
    h.connect_and_open().await;

    assert!(h.connector.emit_close(&inst(), CloseReason::LoggedOut).await);
    let credentials = &h.credentials;
    assert!(
        eventually(|| async move { credentials.get_all(&inst()).await.unwrap().is_empty() })
            .await
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(
        h.runtime.connections().status(&inst()).await,
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_rotated_credentials_are_persisted() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connect_and_open().await;

    h.connector
        .emit(
            &inst(),
            leadflow_core::TransportEvent::Credentials {
                key: SESSION_KEY.into(),
                value: Some(b"rotated".to_vec()),
            },
        )
        .await;
    let credentials = &h.credentials;
    assert!(
        eventually(|| async move {
            credentials
                .get_all(&inst())
                .await
                .unwrap()
                .get(SESSION_KEY)
                .is_some_and(|v| v == b"rotated")
        })
        .await
    );

    h.connector
        .emit(
            &inst(),
            leadflow_core::TransportEvent::Credentials {
                key: SESSION_KEY.into(),
                value: None,
            },
        )
        .await;
    assert!(
        eventually(|| async move { credentials.get_all(&inst()).await.unwrap().is_empty() })
            .await
    );
}

// ---- Test 4: Logout and delete ----

#[tokio::test(start_paused = true)]
async fn test_logout_tears_down_session_and_ignores_late_events() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.credentials.put(&inst(), SESSION_KEY, b"s1").await.unwrap();
    h.connect_and_open().await;
    let session = h.connector.latest_session(&inst()).await.unwrap();

    h.runtime.connections().logout(&inst()).await.unwrap();
    assert!(session.was_logged_out());
    assert!(h.credentials.get_all(&inst()).await.unwrap().is_empty());
    assert_eq!(
        h.runtime.connections().status(&inst()).await,
        ConnectionState::Disconnected
    );

    // Late events from the torn-down session go nowhere.
    h.connector.emit_message(&inst(), raw_text("100", "Ana", "hi")).await;
    h.connector.emit_close(&inst(), dropped()).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(h.runtime.aggregator().buffer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_and_delete_removes_instance() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connect_and_open().await;

    h.runtime
        .connections()
        .disconnect_and_delete(&inst())
        .await
        .unwrap();
    assert!(h.ts.store.get_instance(&inst()).await.unwrap().is_none());
    assert!(
        h.ts.store
            .list_instances(&TestStore::tenant_id())
            .await
            .unwrap()
            .is_empty()
    );
}

// ---- Test 5: Sending ----

#[tokio::test(start_paused = true)]
async fn test_send_text_requires_connected_session() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let connections = h.runtime.connections();

    let err = connections.send_text(&inst(), "100", "hi").await.unwrap_err();
    assert!(err.is_not_connected());

    connections.connect(&inst()).await.unwrap();
    let err = connections.send_text(&inst(), "100", "hi").await.unwrap_err();
    assert!(err.is_not_connected());

    h.connector.emit_open(&inst(), OWN_JID, None).await;
    assert!(
        eventually(|| async move {
            matches!(
                connections.registry().state(&inst()),
                ConnectionState::Connected { .. }
            )
        })
        .await
    );
    connections
        .send_text(&inst(), "+1 (555) 010-0200", "hello")
        .await
        .unwrap();
    connections
        .send_text(&inst(), "300@s.whatsapp.net", "again")
        .await
        .unwrap();

    let session = h.connector.latest_session(&inst()).await.unwrap();
    assert_eq!(
        session.sent_messages().await,
        vec![
            ("15550100200@s.whatsapp.net".to_string(), "hello".to_string()),
            ("300@s.whatsapp.net".to_string(), "again".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_is_reported() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.connect_and_open().await;
    h.connector
        .latest_session(&inst())
        .await
        .unwrap()
        .set_fail_sends(true);

    let result = h.runtime.connections().send_text(&inst(), "100", "hi").await;
    assert!(result.is_err());
    assert!(!result.unwrap_err().is_not_connected());
}

// ---- Test 6: Teardown while a session is opening ----

#[tokio::test(start_paused = true)]
async fn test_logout_during_connect_discards_new_session() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    h.credentials.put(&inst(), SESSION_KEY, b"s1").await.unwrap();
    let connections = h.runtime.connections();

    let (connect_inst, logout_inst) = (inst(), inst());
    let (connected, logged_out) =
        tokio::join!(connections.connect(&connect_inst), connections.logout(&logout_inst));
    connected.unwrap();
    logged_out.unwrap();

    let session = h.connector.latest_session(&inst()).await.unwrap();
    assert!(session.was_closed());
    assert!(connections.registry().session(&inst()).is_none());

    // Nothing consumes the discarded session's events.
    assert!(!h.connector.emit_open(&inst(), OWN_JID, None).await);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connections.status(&inst()).await, ConnectionState::Disconnected);
    assert!(h.credentials.get_all(&inst()).await.unwrap().is_empty());
    assert_eq!(h.connector.open_count(&inst()).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_during_connect_leaves_no_session() {
    let h = Harness::new(MockScorer::new(50, "ok")).await;
    let connections = h.runtime.connections();

    let (connect_inst, delete_inst) = (inst(), inst());
    let (_, deleted) = tokio::join!(
        connections.connect(&connect_inst),
        connections.disconnect_and_delete(&delete_inst)
    );
    deleted.unwrap();

    assert!(connections.registry().session(&inst()).is_none());
    assert_eq!(
        connections.registry().state(&inst()),
        ConnectionState::Disconnected
    );
    assert!(h.ts.store.get_instance(&inst()).await.unwrap().is_none());
    if let Some(session) = h.connector.latest_session(&inst()).await {
        assert!(session.was_closed());
    }
}

// ---- Test 7: Reconnect while the transport is down ----

#[tokio::test(start_paused = true)]
async fn test_failed_reconnect_is_retried_until_transport_recovers() {
    let h = Harness::with_config(MockScorer::new(50, "ok"), fast_reconnect()).await;
    h.connect_and_open().await;

    h.connector.set_fail_open(true);
    assert!(h.connector.emit_close(&inst(), dropped()).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);

    h.connector.set_fail_open(false);
    assert!(
        h.connector
            .wait_for_opens(&inst(), 2, Duration::from_secs(2))
            .await
    );
    assert!(h.connector.emit_open(&inst(), OWN_JID, None).await);
    let connections = h.runtime.connections();
    assert!(
        eventually(|| async move {
            matches!(
                connections.registry().state(&inst()),
                ConnectionState::Connected { .. }
            )
        })
        .await
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_restore_retries_while_transport_is_down() {
    let h = Harness::with_config(MockScorer::new(50, "ok"), fast_reconnect()).await;
    h.credentials.put(&inst(), SESSION_KEY, b"s1").await.unwrap();
    h.connector.set_fail_open(true);

    h.runtime.connections().ensure_restored().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 0);
    assert_eq!(
        h.runtime.connections().registry().state(&inst()),
        ConnectionState::Disconnected
    );

    h.connector.set_fail_open(false);
    assert!(
        h.connector
            .wait_for_opens(&inst(), 1, Duration::from_secs(2))
            .await
    );
    let creds = h.connector.last_credentials(&inst()).await.unwrap();
    assert_eq!(creds.get(SESSION_KEY).map(Vec::as_slice), Some(&b"s1"[..]));
}

#[tokio::test(start_paused = true)]
async fn test_logout_stops_reconnect_retries() {
    let h = Harness::with_config(MockScorer::new(50, "ok"), fast_reconnect()).await;
    h.connect_and_open().await;

    h.connector.set_fail_open(true);
    assert!(h.connector.emit_close(&inst(), dropped()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.runtime.connections().logout(&inst()).await.unwrap();

    h.connector.set_fail_open(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.connector.open_count(&inst()).await, 1);
    assert_eq!(
        h.runtime.connections().registry().state(&inst()),
        ConnectionState::Disconnected
    );
}
