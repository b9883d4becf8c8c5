// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of the connector around a set of adapters.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use leadflow_config::model::LeadflowConfig;
use leadflow_core::{
    CredentialStore, LeadNotifier, LeadStore, PluginAdapter, Scorer, TransportConnector,
};

use crate::buffer::BufferAggregator;
use crate::dispatch::{Dispatcher, scoring_deadline};
use crate::lifecycle::ConnectionManager;
use crate::registry::SessionRegistry;
use crate::tasks::BackgroundTasks;

/// The adapters the connector runs on.
#[derive(Clone)]
pub struct Adapters {
    pub store: Arc<dyn LeadStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub connector: Arc<dyn TransportConnector>,
    pub scorer: Arc<dyn Scorer>,
    pub notifier: Arc<dyn LeadNotifier>,
}

/// A running connector: sessions, buffers, and the qualification loop.
pub struct Runtime {
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    aggregator: BufferAggregator,
    tasks: BackgroundTasks,
    adapters: Adapters,
    cancel: CancellationToken,
    dispatch_loop: JoinHandle<()>,
}

impl Runtime {
    /// Build every component and start the qualification loop.
    ///
    /// Must be called from within a tokio runtime. Sessions are not restored
    /// until [`ConnectionManager::ensure_restored`] runs.
    pub fn start(config: &LeadflowConfig, adapters: Adapters) -> Self {
        let tasks = BackgroundTasks::new();
        let registry = Arc::new(SessionRegistry::new());
        let (aggregator, completed) =
            BufferAggregator::new(config.buffer.clone(), adapters.store.clone(), tasks.clone());
        let connections = ConnectionManager::new(
            registry,
            adapters.connector.clone(),
            adapters.store.clone(),
            adapters.credentials.clone(),
            aggregator.clone(),
            tasks.clone(),
            config.reconnect.clone(),
        );
        let dispatcher = Dispatcher::new(
            adapters.store.clone(),
            adapters.scorer.clone(),
            adapters.notifier.clone(),
            connections.clone(),
            tasks.clone(),
            scoring_deadline(&config.scorer),
        );

        let cancel = CancellationToken::new();
        let dispatch_loop = tokio::spawn(dispatcher.clone().run(completed, cancel.clone()));

        Self {
            connections,
            dispatcher,
            aggregator,
            tasks,
            adapters,
            cancel,
            dispatch_loop,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn aggregator(&self) -> &BufferAggregator {
        &self.aggregator
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.adapters.store
    }

    /// Stop sessions and the qualification loop, wait up to `drain` for
    /// background work, then shut the adapters down (store last).
    ///
    /// Returns false if background work was still running at the deadline.
    pub async fn shutdown(self, drain: Duration) -> bool {
        info!("shutting down connector");
        self.connections.shutdown().await;
        self.cancel.cancel();
        if let Err(e) = self.dispatch_loop.await {
            warn!(error = %e, "qualification loop ended abnormally");
        }

        let drained = self.tasks.drain(drain).await;
        if !drained {
            warn!(remaining = self.tasks.len(), "background work still running at shutdown");
        }

        let results = [
            (self.adapters.connector.name().to_string(), self.adapters.connector.shutdown().await),
            (self.adapters.scorer.name().to_string(), self.adapters.scorer.shutdown().await),
            (self.adapters.notifier.name().to_string(), self.adapters.notifier.shutdown().await),
            (self.adapters.store.name().to_string(), self.adapters.store.shutdown().await),
        ];
        for (adapter, result) in results {
            if let Err(e) = result {
                warn!(adapter = %adapter, error = %e, "adapter shutdown failed");
            }
        }
        drained
    }
}
