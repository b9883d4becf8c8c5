// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Adapters extend [`PluginAdapter`] and use `#[async_trait]` so they can be
//! held as trait objects.

pub mod adapter;
pub mod credentials;
pub mod notifier;
pub mod scorer;
pub mod store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use credentials::CredentialStore;
pub use notifier::LeadNotifier;
pub use scorer::Scorer;
pub use store::LeadStore;
pub use transport::{TransportConnector, TransportSession};
