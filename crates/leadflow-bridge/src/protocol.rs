// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged with the bridge sidecar.
//!
//! Sidecar -> Leadflow:
//! ```json
//! {"type": "connection", "state": "open", "jid": "5511999:2@s.whatsapp.net", "name": "Shop"}
//! {"type": "connection", "qr": "2@..."}
//! {"type": "connection", "state": "close", "logged_out": false, "status_code": 428, "reason": "lost"}
//! {"type": "message", "message": {"remote_jid": "5511888@s.whatsapp.net", "conversation": "hi"}}
//! {"type": "creds", "key": "creds", "value": "<base64>"}
//! ```
//!
//! Leadflow -> Sidecar:
//! ```json
//! {"type": "hello", "credentials": {"creds": "<base64>"}}
//! {"type": "send_text", "jid": "5511888@s.whatsapp.net", "text": "Hello"}
//! {"type": "logout"}
//! ```

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use leadflow_core::{
    CloseReason, ConnectionUpdate, LeadflowError, LinkPhase, RawInbound, StoredCredentials,
    TransportEvent,
};

/// Frames sent to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Hello { credentials: BTreeMap<String, String> },
    SendText { jid: String, text: String },
    Logout,
}

impl OutboundFrame {
    /// Handshake carrying every stored credential blob, base64-encoded.
    pub fn hello(credentials: &StoredCredentials) -> Self {
        Self::Hello {
            credentials: credentials
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                .collect(),
        }
    }
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Connection {
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        qr: Option<String>,
        #[serde(default)]
        jid: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        logged_out: bool,
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: RawInbound,
    },
    Creds {
        key: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, LeadflowError> {
        serde_json::from_str(text).map_err(|e| LeadflowError::Transport {
            message: format!("malformed bridge frame: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Map the frame to a transport event.
    ///
    /// An `open` state without a `jid`, or an unknown state, carries no phase.
    pub fn into_event(self) -> Result<TransportEvent, LeadflowError> {
        match self {
            Self::Connection {
                state,
                qr,
                jid,
                name,
                logged_out,
                status_code,
                reason,
            } => {
                let (phase, close_reason) = match state.as_deref() {
                    Some("connecting") => (Some(LinkPhase::Connecting), None),
                    Some("open") => (jid.map(|jid| LinkPhase::Open { jid, name }), None),
                    Some("close") => {
                        let reason = if logged_out {
                            CloseReason::LoggedOut
                        } else {
                            CloseReason::Other {
                                code: status_code,
                                message: reason.unwrap_or_else(|| "closed by bridge".into()),
                            }
                        };
                        (Some(LinkPhase::Close), Some(reason))
                    }
                    _ => (None, None),
                };
                Ok(TransportEvent::Connection(ConnectionUpdate {
                    phase,
                    qr,
                    close_reason,
                }))
            }
            Self::Message { message } => Ok(TransportEvent::Message(message)),
            Self::Creds { key, value } => {
                let value = value
                    .map(|v| STANDARD.decode(v))
                    .transpose()
                    .map_err(|e| LeadflowError::Transport {
                        message: format!("credential blob {key} is not base64"),
                        source: Some(Box::new(e)),
                    })?;
                Ok(TransportEvent::Credentials { key, value })
            }
        }
    }
}

/// Close event for a socket that went away without a close frame from the sidecar.
pub fn dropped(code: Option<u16>, message: impl Into<String>) -> TransportEvent {
    TransportEvent::Connection(ConnectionUpdate {
        phase: Some(LinkPhase::Close),
        qr: None,
        close_reason: Some(CloseReason::Other {
            code,
            message: message.into(),
        }),
    })
}
