// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder these are no-ops.

use metrics::describe_counter;

use crate::buffer::FlushReason;

/// Register all connector metric descriptions.
pub fn register_metrics() {
    describe_counter!("leadflow_leads_created_total", "Leads created, by source");
    describe_counter!(
        "leadflow_buffers_flushed_total",
        "Contact buffers handed to qualification, by reason"
    );
    describe_counter!(
        "leadflow_reconnects_total",
        "Transport reconnects scheduled after a non-logout close"
    );
    describe_counter!(
        "leadflow_scorer_fallbacks_total",
        "Qualifications that fell back to the default score"
    );
}

pub fn record_lead_created(source: &str) {
    metrics::counter!("leadflow_leads_created_total", "source" => source.to_string()).increment(1);
}

pub fn record_buffer_flushed(reason: FlushReason) {
    metrics::counter!("leadflow_buffers_flushed_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_reconnect() {
    metrics::counter!("leadflow_reconnects_total").increment(1);
}

pub fn record_scorer_fallback() {
    metrics::counter!("leadflow_scorer_fallbacks_total").increment(1);
}
