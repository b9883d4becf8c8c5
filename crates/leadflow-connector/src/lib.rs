// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversational channel connector.
//!
//! - [`ConnectionManager`] owns one transport session per instance, drives
//!   reconnects, and exposes live status and QR codes.
//! - [`BufferAggregator`] debounces each contact's inbound messages into a
//!   single completed conversation.
//! - [`Dispatcher`] scores completed conversations and one-shot structured
//!   leads, finalizes the lead, and fires the outbound webhook.
//!
//! [`Runtime`] wires the three together around a shared [`SessionRegistry`]
//! and [`BackgroundTasks`] executor.

pub mod buffer;
pub mod dispatch;
pub mod inbound;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod shutdown;
pub mod tasks;
pub mod webhook;
pub mod welcome;

pub use buffer::{BufferAggregator, BufferMode, BufferSnapshot, CompletedConversation, FlushReason};
pub use dispatch::Dispatcher;
pub use lifecycle::ConnectionManager;
pub use registry::SessionRegistry;
pub use runtime::{Adapters, Runtime};
pub use tasks::BackgroundTasks;
pub use webhook::WebhookNotifier;
