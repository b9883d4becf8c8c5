// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow serve` command implementation.
//!
//! Opens the SQLite store and credential vault, builds the bridge transport,
//! Anthropic scorer, and webhook notifier, starts the connector runtime, and
//! serves the ingress gateway until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use leadflow_bridge::BridgeConnector;
use leadflow_config::model::LeadflowConfig;
use leadflow_connector::shutdown::install_signal_handler;
use leadflow_connector::{Adapters, Runtime, WebhookNotifier};
use leadflow_core::LeadflowError;
use leadflow_gateway::{GatewayState, start_server};
use leadflow_scorer::AnthropicScorer;
use leadflow_storage::SqliteLeadStore;
use leadflow_vault::kdf::KdfParams;
use leadflow_vault::{Vault, VaultCredentialStore, get_vault_passphrase};
use tracing::{error, info};

/// How long shutdown waits for in-flight scoring, webhooks, and welcomes.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Runs the `leadflow serve` command.
pub async fn run_serve(config: LeadflowConfig) -> Result<(), LeadflowError> {
    init_tracing(&config.service.log_level);
    leadflow_connector::metrics::register_metrics();

    info!(service = %config.service.name, "starting leadflow serve");

    let store = Arc::new(SqliteLeadStore::new(config.storage.clone()));
    store.initialize().await?;

    let credentials = {
        let passphrase = get_vault_passphrase()?;
        let conn = store.database()?.connection().clone();
        let vault = Vault::open_or_create(conn, &passphrase, KdfParams::from(&config.vault))
            .await
            .map_err(|e| {
                error!(error = %e, "credential vault could not be unlocked");
                eprintln!(
                    "error: credential vault cannot be unlocked. \
                     Set LEADFLOW_VAULT_KEY or provide the passphrase interactively."
                );
                e
            })?;
        Arc::new(VaultCredentialStore::new(vault))
    };

    let connector = Arc::new(BridgeConnector::new(&config.bridge)?);
    let scorer = Arc::new(AnthropicScorer::new(&config.scorer).map_err(|e| {
        error!(error = %e, "failed to initialize scorer");
        eprintln!("error: scorer API key required. Set scorer.api_key or ANTHROPIC_API_KEY.");
        e
    })?);
    let notifier = Arc::new(WebhookNotifier::new(&config.webhook)?);

    let runtime = Runtime::start(
        &config,
        Adapters {
            store,
            credentials,
            connector,
            scorer,
            notifier,
        },
    );
    runtime.connections().ensure_restored().await;

    let shutdown = install_signal_handler();

    let mut gateway = if config.gateway.enabled {
        let state = GatewayState::new(
            runtime.store().clone(),
            runtime.dispatcher().clone(),
            &config.gateway,
        );
        let gateway_config = config.gateway.clone();
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            start_server(&gateway_config, state, token).await
        }))
    } else {
        info!("ingress gateway disabled");
        None
    };

    let finished_early = match gateway.as_mut() {
        Some(handle) => tokio::select! {
            _ = shutdown.cancelled() => None,
            joined = handle => Some(joined),
        },
        None => {
            shutdown.cancelled().await;
            None
        }
    };
    info!("shutdown requested");

    let failure = match finished_early {
        Some(joined) => {
            shutdown.cancel();
            gateway_failure(joined)
        }
        None => match gateway {
            Some(handle) => gateway_failure(handle.await),
            None => None,
        },
    };

    let drained = runtime.shutdown(SHUTDOWN_DRAIN).await;
    info!(drained, "leadflow stopped");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn gateway_failure(
    joined: Result<Result<(), LeadflowError>, tokio::task::JoinError>,
) -> Option<LeadflowError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!(error = %e, "ingress gateway failed");
            Some(e)
        }
        Err(e) => {
            error!(error = %e, "ingress gateway task panicked");
            Some(LeadflowError::Internal(format!("gateway task failed: {e}")))
        }
    }
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("leadflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
