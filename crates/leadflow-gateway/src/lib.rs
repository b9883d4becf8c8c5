// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP ingress for structured leads.
//!
//! Web forms and third-party integrations post a contact to `/v1/leads` with
//! a tenant API key. Requests are rate limited per client address, validated,
//! and handed to the qualification dispatcher.

pub mod handlers;
pub mod rate_limit;
pub mod server;
pub mod validation;

pub use rate_limit::RateLimiter;
pub use server::{GatewayState, build_router, start_server};
