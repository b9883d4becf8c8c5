// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared harness: a running connector over mock adapters and a temp store.

#![allow(dead_code)]

use std::sync::Arc;

use leadflow_config::model::LeadflowConfig;
use leadflow_connector::{Adapters, Runtime};
use leadflow_core::{ConnectionState, InstanceId, Lead, LeadStatus, LeadStore};
use leadflow_test_utils::{
    MemoryCredentialStore, MockConnector, MockNotifier, MockScorer, TestStore, eventually,
};

pub const OWN_JID: &str = "5511000:3@s.whatsapp.net";

pub struct Harness {
    pub ts: TestStore,
    pub connector: Arc<MockConnector>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub scorer: Arc<MockScorer>,
    pub notifier: Arc<MockNotifier>,
    pub runtime: Runtime,
}

pub fn inst() -> InstanceId {
    InstanceId("inst-1".into())
}

impl Harness {
    pub async fn new(scorer: MockScorer) -> Self {
        Self::with_config(scorer, LeadflowConfig::default()).await
    }

    pub async fn with_config(scorer: MockScorer, config: LeadflowConfig) -> Self {
        let ts = TestStore::new().await.unwrap();
        ts.seed_instance("inst-1").await.unwrap();
        let connector = Arc::new(MockConnector::new());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let scorer = Arc::new(scorer);
        let notifier = Arc::new(MockNotifier::new());
        let runtime = Runtime::start(
            &config,
            Adapters {
                store: ts.store.clone(),
                credentials: credentials.clone(),
                connector: connector.clone(),
                scorer: scorer.clone(),
                notifier: notifier.clone(),
            },
        );
        Self {
            ts,
            connector,
            credentials,
            scorer,
            notifier,
            runtime,
        }
    }

    /// Connect `inst-1` and report the session open.
    pub async fn connect_and_open(&self) {
        self.runtime.connections().connect(&inst()).await.unwrap();
        assert!(self.connector.emit_open(&inst(), OWN_JID, Some("Acme Sales")).await);
        let connections = self.runtime.connections();
        assert!(
            eventually(|| async move {
                matches!(
                    connections.registry().state(&inst()),
                    ConnectionState::Connected { .. }
                )
            })
            .await
        );
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.ts.store.list_leads(&TestStore::tenant_id()).await.unwrap()
    }

    /// Wait until the tenant has exactly one lead in `status`.
    pub async fn wait_for_lead(&self, status: LeadStatus) -> Lead {
        let store = &self.ts.store;
        let found = eventually(|| async move {
            store
                .list_leads(&TestStore::tenant_id())
                .await
                .is_ok_and(|l| l.len() == 1 && l[0].status == status)
        })
        .await;
        assert!(found, "no single {status} lead appeared");
        self.leads().await.remove(0)
    }
}
