// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory per-instance connection tables.
//!
//! Every table is a `DashMap` keyed by instance id. Entry guards are never
//! held across an await.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;

use leadflow_core::{AccountInfo, ConnectionState, InstanceId, TransportSession};

/// Coarse link state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The live session of an instance and the epoch it was opened under.
pub struct LiveSession {
    pub epoch: u64,
    pub session: Arc<dyn TransportSession>,
    pump: Option<AbortHandle>,
}

impl LiveSession {
    /// Stop the session's event pump, if one is attached.
    pub fn abort_pump(&self) {
        if let Some(pump) = &self.pump {
            pump.abort();
        }
    }
}

/// Link state, QR codes, account info, live sessions and epochs of every instance.
#[derive(Default)]
pub struct SessionRegistry {
    links: DashMap<InstanceId, LinkState>,
    qr_codes: DashMap<InstanceId, String>,
    accounts: DashMap<InstanceId, AccountInfo>,
    sessions: DashMap<InstanceId, LiveSession>,
    epochs: DashMap<InstanceId, u64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move an idle instance to `Connecting`.
    ///
    /// Returns false if it is already connecting or connected.
    pub fn try_begin_connect(&self, id: &InstanceId) -> bool {
        match self.links.entry(id.clone()) {
            Entry::Occupied(mut o) => match o.get() {
                LinkState::Connecting | LinkState::Connected => false,
                LinkState::Disconnected => {
                    o.insert(LinkState::Connecting);
                    true
                }
            },
            Entry::Vacant(v) => {
                v.insert(LinkState::Connecting);
                true
            }
        }
    }

    pub fn link(&self, id: &InstanceId) -> LinkState {
        self.links.get(id).map(|l| *l).unwrap_or_default()
    }

    pub fn set_link(&self, id: &InstanceId, state: LinkState) {
        self.links.insert(id.clone(), state);
    }

    pub fn qr(&self, id: &InstanceId) -> Option<String> {
        self.qr_codes.get(id).map(|q| q.clone())
    }

    pub fn set_qr(&self, id: &InstanceId, qr: String) {
        self.qr_codes.insert(id.clone(), qr);
    }

    pub fn clear_qr(&self, id: &InstanceId) {
        self.qr_codes.remove(id);
    }

    pub fn account(&self, id: &InstanceId) -> Option<AccountInfo> {
        self.accounts.get(id).map(|a| a.clone())
    }

    pub fn set_account(&self, id: &InstanceId, account: AccountInfo) {
        self.accounts.insert(id.clone(), account);
    }

    /// Start a new epoch for the instance and return it.
    pub fn next_epoch(&self, id: &InstanceId) -> u64 {
        let mut epoch = self.epochs.entry(id.clone()).or_insert(0);
        *epoch += 1;
        *epoch
    }

    pub fn current_epoch(&self, id: &InstanceId) -> u64 {
        self.epochs.get(id).map(|e| *e).unwrap_or(0)
    }

    pub fn is_current(&self, id: &InstanceId, epoch: u64) -> bool {
        self.current_epoch(id) == epoch
    }

    pub fn install_session(&self, id: &InstanceId, epoch: u64, session: Arc<dyn TransportSession>) {
        self.sessions.insert(
            id.clone(),
            LiveSession {
                epoch,
                session,
                pump: None,
            },
        );
    }

    /// Install `session` under a fresh epoch, but only if the epoch is still
    /// `seen`. Returns the new epoch, or `None` if the instance was logged out,
    /// shut down or replaced since `seen` was read.
    ///
    /// Lock order is epochs, then sessions.
    pub fn install_if_current(
        &self,
        id: &InstanceId,
        seen: u64,
        session: Arc<dyn TransportSession>,
    ) -> Option<u64> {
        let mut epoch = self.epochs.entry(id.clone()).or_insert(0);
        if *epoch != seen {
            return None;
        }
        *epoch += 1;
        self.install_session(id, *epoch, session);
        Some(*epoch)
    }

    /// Attach the pump's abort handle to the session opened under `epoch`.
    pub fn attach_pump(&self, id: &InstanceId, epoch: u64, pump: AbortHandle) {
        match self.sessions.get_mut(id) {
            Some(mut live) if live.epoch == epoch => live.pump = Some(pump),
            _ => pump.abort(),
        }
    }

    pub fn session(&self, id: &InstanceId) -> Option<Arc<dyn TransportSession>> {
        self.sessions.get(id).map(|s| s.session.clone())
    }

    /// Remove the live session whatever its epoch.
    pub fn take_session(&self, id: &InstanceId) -> Option<LiveSession> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Remove the live session only if it was opened under `epoch`.
    pub fn remove_session_if(&self, id: &InstanceId, epoch: u64) -> Option<LiveSession> {
        self.sessions
            .remove_if(id, |_, s| s.epoch == epoch)
            .map(|(_, s)| s)
    }

    /// Bump the epoch so events from the current session are ignored.
    pub fn invalidate(&self, id: &InstanceId) {
        self.next_epoch(id);
    }

    /// Drop link state, QR and account info. Epochs are kept.
    pub fn forget(&self, id: &InstanceId) {
        self.links.remove(id);
        self.qr_codes.remove(id);
        self.accounts.remove(id);
    }

    /// Instances that currently hold a live session.
    pub fn live_instances(&self) -> Vec<InstanceId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Caller-facing connection state.
    pub fn state(&self, id: &InstanceId) -> ConnectionState {
        match self.link(id) {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::Connecting => match self.qr(id) {
                Some(qr) => ConnectionState::Scanning { qr },
                None => ConnectionState::Connecting,
            },
            LinkState::Connected => ConnectionState::Connected {
                account: self.account(id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_test_utils::MockSession;

    fn id() -> InstanceId {
        InstanceId("inst-1".into())
    }

    #[test]
    fn begin_connect_is_exclusive() {
        let reg = SessionRegistry::new();
        assert!(reg.try_begin_connect(&id()));
        assert!(!reg.try_begin_connect(&id()));

        reg.set_link(&id(), LinkState::Connected);
        assert!(!reg.try_begin_connect(&id()));

        reg.set_link(&id(), LinkState::Disconnected);
        assert!(reg.try_begin_connect(&id()));
    }

    #[test]
    fn state_reports_scanning_only_while_connecting() {
        let reg = SessionRegistry::new();
        assert_eq!(reg.state(&id()), ConnectionState::Disconnected);

        reg.try_begin_connect(&id());
        assert_eq!(reg.state(&id()), ConnectionState::Connecting);

        reg.set_qr(&id(), "QR-1".into());
        assert_eq!(
            reg.state(&id()),
            ConnectionState::Scanning { qr: "QR-1".into() }
        );

        let account = AccountInfo {
            phone: "555".into(),
            name: "Shop".into(),
            jid: "555:3@s.whatsapp.net".into(),
        };
        reg.set_link(&id(), LinkState::Connected);
        reg.set_account(&id(), account.clone());
        assert_eq!(
            reg.state(&id()),
            ConnectionState::Connected {
                account: Some(account)
            }
        );
    }

    #[test]
    fn remove_session_respects_epoch() {
        let reg = SessionRegistry::new();
        let first = reg.next_epoch(&id());
        reg.install_session(&id(), first, Arc::new(MockSession::default()));

        reg.invalidate(&id());
        let second = reg.current_epoch(&id());
        assert_ne!(first, second);
        assert!(!reg.is_current(&id(), first));

        assert!(reg.remove_session_if(&id(), second).is_none());
        assert!(reg.remove_session_if(&id(), first).is_some());
        assert!(reg.session(&id()).is_none());
    }

    #[test]
    fn forget_keeps_epoch() {
        let reg = SessionRegistry::new();
        let epoch = reg.next_epoch(&id());
        reg.try_begin_connect(&id());
        reg.set_qr(&id(), "QR".into());
        reg.forget(&id());
        assert_eq!(reg.state(&id()), ConnectionState::Disconnected);
        assert_eq!(reg.current_epoch(&id()), epoch);
    }

    #[test]
    fn install_if_current_rejects_stale_epoch() {
        let reg = SessionRegistry::new();
        let seen = reg.current_epoch(&id());
        reg.invalidate(&id());
        assert!(
            reg.install_if_current(&id(), seen, Arc::new(MockSession::default()))
                .is_none()
        );
        assert!(reg.session(&id()).is_none());

        let seen = reg.current_epoch(&id());
        let epoch = reg
            .install_if_current(&id(), seen, Arc::new(MockSession::default()))
            .unwrap();
        assert_eq!(epoch, seen + 1);
        assert!(reg.is_current(&id(), epoch));
        assert!(reg.session(&id()).is_some());
    }
}
