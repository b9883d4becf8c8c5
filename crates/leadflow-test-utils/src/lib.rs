// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Leadflow integration tests.
//!
//! Provides mock adapters and fixtures for fast, deterministic tests without
//! a chat sidecar, an AI endpoint, or a webhook receiver.
//!
//! # Components
//!
//! - [`MockConnector`] / [`MockSession`] - transport with injectable events and captured sends
//! - [`MockScorer`] - scorer with scripted results
//! - [`MockNotifier`] - webhook notifier that records deliveries
//! - [`MemoryCredentialStore`] - in-memory credential blobs
//! - [`harness`] - temp SQLite store and seed helpers

pub mod harness;
pub mod memory_credentials;
pub mod mock_notifier;
pub mod mock_scorer;
pub mod mock_transport;

pub use harness::{TestStore, eventually, raw_text};
pub use memory_credentials::MemoryCredentialStore;
pub use mock_notifier::MockNotifier;
pub use mock_scorer::MockScorer;
pub use mock_transport::{MockConnector, MockSession};
