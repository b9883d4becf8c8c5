// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message filtering and contact resolution.
//!
//! Transports deliver the sender's address in one of several fields
//! depending on the account type. Only personal-chat addresses identify a
//! contact; anything else (groups, broadcasts, linked-device ids) is dropped.

use leadflow_core::{ContactId, RawInbound};

/// Address suffix of a personal chat.
pub const PERSONAL_SUFFIX: &str = "@s.whatsapp.net";
const STATUS_BROADCAST: &str = "status@broadcast";
const GROUP_SUFFIX: &str = "@g.us";

/// A text message that passed the inbound filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub contact: ContactId,
    pub text: String,
    pub push_name: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// First personal-chat address among `remote_jid`, `remote_jid_alt`, `sender_pn`.
pub fn resolve_contact(raw: &RawInbound) -> Option<ContactId> {
    [&raw.remote_jid, &raw.remote_jid_alt, &raw.sender_pn]
        .into_iter()
        .flatten()
        .find_map(|jid| {
            jid.strip_suffix(PERSONAL_SUFFIX)
                .filter(|phone| !phone.is_empty())
        })
        .map(|phone| ContactId(phone.to_string()))
}

/// Apply the inbound filter. `own_phone` is the instance's account phone.
pub fn filter_inbound(raw: &RawInbound, own_phone: Option<&str>, now_ms: i64) -> Option<InboundText> {
    if raw.from_me || !raw.has_content {
        return None;
    }
    let remote = raw.remote_jid.as_deref().unwrap_or_default();
    if remote == STATUS_BROADCAST || remote.ends_with(GROUP_SUFFIX) {
        return None;
    }

    let contact = resolve_contact(raw)?;
    if own_phone.is_some_and(|own| own == contact.0) {
        return None;
    }

    let text = raw
        .conversation
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(raw.extended_text.as_deref())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return None;
    }

    Some(InboundText {
        contact,
        text: text.to_string(),
        push_name: raw.push_name.clone().filter(|n| !n.is_empty()),
        timestamp_ms: raw.timestamp.map_or(now_ms, |secs| secs * 1000),
    })
}

/// Personal-chat address for a contact or bare phone number.
///
/// Anything already carrying the suffix is returned unchanged; otherwise
/// non-digits are stripped.
pub fn personal_jid(contact: &str) -> String {
    if contact.contains(PERSONAL_SUFFIX) {
        return contact.to_string();
    }
    let digits: String = contact.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{PERSONAL_SUFFIX}")
}

/// Phone part of an account address: `"555:12@s.whatsapp.net"` → `"555"`.
pub fn phone_from_jid(jid: &str) -> &str {
    let before_device = jid.split(':').next().unwrap_or(jid);
    before_device.split('@').next().unwrap_or(before_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(remote: &str, text: &str) -> RawInbound {
        RawInbound {
            remote_jid: Some(remote.to_string()),
            conversation: Some(text.to_string()),
            has_content: true,
            ..Default::default()
        }
    }

    #[test]
    fn resolves_from_remote_jid() {
        let msg = raw("100@s.whatsapp.net", "hi");
        assert_eq!(resolve_contact(&msg), Some(ContactId("100".into())));
    }

    #[test]
    fn resolves_linked_id_through_alt_field() {
        let msg = RawInbound {
            remote_jid: Some("8812@lid".into()),
            remote_jid_alt: Some("200@s.whatsapp.net".into()),
            ..Default::default()
        };
        assert_eq!(resolve_contact(&msg), Some(ContactId("200".into())));
    }

    #[test]
    fn resolves_through_sender_pn_last() {
        let msg = RawInbound {
            remote_jid: Some("8812@lid".into()),
            remote_jid_alt: Some("8812@lid".into()),
            sender_pn: Some("300@s.whatsapp.net".into()),
            ..Default::default()
        };
        assert_eq!(resolve_contact(&msg), Some(ContactId("300".into())));
    }

    #[test]
    fn unresolvable_sender_is_none() {
        let msg = RawInbound {
            remote_jid: Some("8812@lid".into()),
            ..Default::default()
        };
        assert_eq!(resolve_contact(&msg), None);
        assert_eq!(filter_inbound(&msg, None, 0), None);
    }

    #[test]
    fn drops_own_group_broadcast_and_empty() {
        let mut own = raw("100@s.whatsapp.net", "hi");
        own.from_me = true;
        assert!(filter_inbound(&own, None, 0).is_none());

        assert!(filter_inbound(&raw("status@broadcast", "hi"), None, 0).is_none());
        assert!(filter_inbound(&raw("1203@g.us", "hi"), None, 0).is_none());
        assert!(filter_inbound(&raw("100@s.whatsapp.net", "   "), None, 0).is_none());

        let mut media = raw("100@s.whatsapp.net", "");
        media.conversation = None;
        assert!(filter_inbound(&media, None, 0).is_none());

        let mut protocol = raw("100@s.whatsapp.net", "hi");
        protocol.has_content = false;
        assert!(filter_inbound(&protocol, None, 0).is_none());
    }

    #[test]
    fn drops_messages_from_own_number() {
        let msg = raw("555@s.whatsapp.net", "echo");
        assert!(filter_inbound(&msg, Some("555"), 0).is_none());
        assert!(filter_inbound(&msg, Some("556"), 0).is_some());
    }

    #[test]
    fn falls_back_to_extended_text_and_converts_timestamp() {
        let msg = RawInbound {
            remote_jid: Some("100@s.whatsapp.net".into()),
            conversation: Some(String::new()),
            extended_text: Some("see https://example.com".into()),
            push_name: Some("Ana".into()),
            has_content: true,
            timestamp: Some(1_700_000_000),
            ..Default::default()
        };
        let text = filter_inbound(&msg, None, 42).unwrap();
        assert_eq!(text.text, "see https://example.com");
        assert_eq!(text.push_name.as_deref(), Some("Ana"));
        assert_eq!(text.timestamp_ms, 1_700_000_000_000);

        let no_ts = filter_inbound(&raw("100@s.whatsapp.net", "x"), None, 42).unwrap();
        assert_eq!(no_ts.timestamp_ms, 42);
    }

    #[test]
    fn personal_jid_normalizes_phone() {
        assert_eq!(personal_jid("+54 9 11-2345"), "549112345@s.whatsapp.net");
        assert_eq!(personal_jid("100@s.whatsapp.net"), "100@s.whatsapp.net");
    }

    #[test]
    fn phone_from_jid_strips_device_and_server() {
        assert_eq!(phone_from_jid("555:12@s.whatsapp.net"), "555");
        assert_eq!(phone_from_jid("555@s.whatsapp.net"), "555");
        assert_eq!(phone_from_jid(""), "");
    }
}
