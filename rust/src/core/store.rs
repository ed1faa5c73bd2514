// Ordered, deduplicated message log for one conversation and the
// reconciliation that merges the three input sources (bulk snapshot, live
// channel, local optimistic sends) without duplication or reordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;

use crate::state::MessageDeliveryState;

/// Message-shaped record as delivered by the backend (snapshot or live
/// channel). Validated here; everything past this point is typed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireMessage {
    pub(crate) id: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) sender_id: String,
    pub(crate) text: Option<String>,
    pub(crate) media_ref: Option<String>,
    pub(crate) timestamp: i64,
    pub(crate) reactions: BTreeMap<String, BTreeSet<String>>,
    pub(crate) seen_by: BTreeSet<String>,
    pub(crate) parent_id: Option<String>,
}

impl Default for WireMessage {
    fn default() -> Self {
        Self {
            id: None,
            client_id: None,
            sender_id: String::new(),
            text: None,
            media_ref: None,
            timestamp: 0,
            reactions: BTreeMap::new(),
            seen_by: BTreeSet::new(),
            parent_id: None,
        }
    }
}

/// One stored message. Immutable once confirmed except for in-place updates
/// (reactions, seen-by) applied by later deliveries referencing its id.
#[derive(Debug, Clone)]
pub(crate) struct MessageRecord {
    pub(crate) id: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) sender_id: String,
    pub(crate) text: Option<String>,
    pub(crate) media_ref: Option<String>,
    pub(crate) timestamp: i64,
    pub(crate) reactions: BTreeMap<String, BTreeSet<String>>,
    pub(crate) seen_by: BTreeSet<String>,
    pub(crate) parent_id: Option<String>,
    pub(crate) delivery: MessageDeliveryState,
}

impl MessageRecord {
    fn from_wire(wire: WireMessage) -> Self {
        Self {
            id: wire.id,
            client_id: wire.client_id,
            sender_id: wire.sender_id,
            text: wire.text,
            media_ref: wire.media_ref,
            timestamp: wire.timestamp,
            reactions: wire.reactions,
            seen_by: wire.seen_by,
            parent_id: wire.parent_id,
            delivery: MessageDeliveryState::Sent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    /// An echo of our own send: the stored optimistic message was replaced in
    /// place, keeping its original position.
    ResolvedOptimistic,
    /// In-place update of an already-confirmed message (reaction, seen-by).
    Updated,
    /// Genuinely new message, appended at the end.
    Appended,
    /// Redelivery or unmatched client-only record; dropped.
    Discarded,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ReconcileError {
    /// Record carries neither a server id nor a client id; inserting it
    /// would make deduplication impossible.
    #[error("incoming message has neither id nor clientId")]
    MissingIdentifiers,
}

#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    records: Vec<MessageRecord>,
    by_id: HashMap<String, usize>,
    by_client_id: HashMap<String, usize>,
    rejected: u64,
}

impl MessageStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn rejected(&self) -> u64 {
        self.rejected
    }

    pub(crate) fn is_confirmed(&self, message_id: &str) -> bool {
        self.by_id.contains_key(message_id)
    }

    pub(crate) fn get_by_id(&self, message_id: &str) -> Option<&MessageRecord> {
        self.by_id.get(message_id).map(|&idx| &self.records[idx])
    }

    /// One-time bulk initializer. No-ops (returns false) once the store holds
    /// anything, so a slow fetch can never clobber live reconciliation.
    pub(crate) fn load_snapshot(&mut self, messages: Vec<WireMessage>) -> bool {
        if !self.records.is_empty() {
            tracing::warn!(
                count = messages.len(),
                "snapshot ignored: store already has live data"
            );
            return false;
        }
        for wire in messages {
            // Snapshot rows go through the same reconciliation so a snapshot
            // containing duplicates cannot violate uniqueness.
            if let Err(e) = self.apply_incoming(wire) {
                tracing::warn!(%e, "snapshot record rejected");
            }
        }
        true
    }

    /// Reconciliation for one incoming record. Rule order is a contract:
    /// 1. clientId match  -> replace our optimistic message in place (echo)
    /// 2. id match        -> update the confirmed message in place
    /// 3. unseen id       -> append as a new message
    /// 4. otherwise       -> discard (at-least-once redelivery)
    ///
    /// Rule 1 must run before rule 3: an echo carries both our clientId and a
    /// server id the store has never seen, and must resolve the pending
    /// placeholder rather than duplicate it.
    pub(crate) fn apply_incoming(
        &mut self,
        incoming: WireMessage,
    ) -> Result<ApplyOutcome, ReconcileError> {
        if incoming.id.is_none() && incoming.client_id.is_none() {
            self.rejected += 1;
            return Err(ReconcileError::MissingIdentifiers);
        }

        if let Some(client_id) = incoming.client_id.clone() {
            if let Some(&idx) = self.by_client_id.get(&client_id) {
                let new_id = incoming.id.clone();
                self.replace_at(idx, incoming);
                if let Some(id) = new_id {
                    self.by_id.insert(id, idx);
                }
                return Ok(ApplyOutcome::ResolvedOptimistic);
            }
        }

        let Some(id) = incoming.id.clone() else {
            // Client-only record that matches nothing we sent. Nothing safe
            // to merge it into; treat as a duplicate delivery.
            tracing::debug!("discarding client-only record with unknown clientId");
            return Ok(ApplyOutcome::Discarded);
        };

        if let Some(&idx) = self.by_id.get(&id) {
            if let Some(client_id) = incoming.client_id.clone() {
                self.by_client_id.insert(client_id, idx);
            }
            self.replace_at(idx, incoming);
            return Ok(ApplyOutcome::Updated);
        }

        let idx = self.records.len();
        if let Some(client_id) = incoming.client_id.clone() {
            self.by_client_id.insert(client_id, idx);
        }
        self.by_id.insert(id, idx);
        self.records.push(MessageRecord::from_wire(incoming));
        Ok(ApplyOutcome::Appended)
    }

    /// Inserts a pending local message at the end. The caller supplies a
    /// fresh clientId; if an echo for that clientId already landed (the
    /// channel outran the local append) the insert is skipped so uniqueness
    /// holds.
    pub(crate) fn append_optimistic(&mut self, record: MessageRecord) -> bool {
        let Some(client_id) = record.client_id.clone() else {
            tracing::warn!("optimistic message without clientId rejected");
            return false;
        };
        if self.by_client_id.contains_key(&client_id) {
            tracing::warn!(%client_id, "optimistic append skipped: clientId already present");
            return false;
        }
        if let Some(id) = record.id.clone() {
            // Optimistic messages are pre-confirmation by definition.
            tracing::warn!(%id, "optimistic message unexpectedly carries a server id");
            self.by_id.insert(id, self.records.len());
        }
        self.by_client_id.insert(client_id, self.records.len());
        self.records.push(record);
        true
    }

    pub(crate) fn set_delivery(&mut self, client_id: &str, delivery: MessageDeliveryState) {
        if let Some(&idx) = self.by_client_id.get(client_id) {
            self.records[idx].delivery = delivery;
        }
    }

    pub(crate) fn set_media_ref(&mut self, client_id: &str, media_ref: String) {
        if let Some(&idx) = self.by_client_id.get(client_id) {
            self.records[idx].media_ref = Some(media_ref);
        }
    }

    /// In-place replacement preserving position. seen-by is merged as a set
    /// union so it only grows; a stale redelivery cannot shrink it.
    fn replace_at(&mut self, idx: usize, incoming: WireMessage) {
        let old = &mut self.records[idx];
        let mut next = MessageRecord::from_wire(incoming);
        if next.client_id.is_none() {
            next.client_id = old.client_id.take();
        }
        if next.id.is_none() {
            next.id = old.id.take();
        }
        next.seen_by.extend(std::mem::take(&mut old.seen_by));
        *old = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(id: Option<&str>, client_id: Option<&str>, sender: &str, text: &str) -> WireMessage {
        WireMessage {
            id: id.map(str::to_string),
            client_id: client_id.map(str::to_string),
            sender_id: sender.to_string(),
            text: Some(text.to_string()),
            timestamp: 1_700_000_000,
            ..WireMessage::default()
        }
    }

    fn optimistic(client_id: &str, sender: &str, text: &str) -> MessageRecord {
        MessageRecord {
            id: None,
            client_id: Some(client_id.to_string()),
            sender_id: sender.to_string(),
            text: Some(text.to_string()),
            media_ref: None,
            timestamp: 1_700_000_000,
            reactions: BTreeMap::new(),
            seen_by: BTreeSet::new(),
            parent_id: None,
            delivery: MessageDeliveryState::Pending,
        }
    }

    #[test]
    fn redelivery_is_idempotent() {
        let mut store = MessageStore::new();
        let m = wire(Some("42"), None, "peer", "hi");
        assert_eq!(store.apply_incoming(m.clone()), Ok(ApplyOutcome::Appended));
        for _ in 0..3 {
            store.apply_incoming(m.clone()).unwrap();
        }
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn echo_resolves_optimistic_in_place() {
        let mut store = MessageStore::new();
        assert!(store.append_optimistic(optimistic("c1", "me", "hi")));
        let outcome = store
            .apply_incoming(wire(Some("42"), Some("c1"), "me", "hi"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::ResolvedOptimistic);
        assert_eq!(store.records().len(), 1);
        let rec = &store.records()[0];
        assert_eq!(rec.id.as_deref(), Some("42"));
        assert_eq!(rec.client_id.as_deref(), Some("c1"));
        assert!(store.is_confirmed("42"));
    }

    #[test]
    fn echo_with_unseen_id_prefers_client_id_match() {
        // Rule 1 must win over rule 3: the echo carries a novel server id,
        // but the pending placeholder must be replaced, not duplicated.
        let mut store = MessageStore::new();
        store.append_optimistic(optimistic("c1", "me", "hi"));
        store
            .apply_incoming(wire(Some("9"), None, "peer", "other"))
            .unwrap();
        store
            .apply_incoming(wire(Some("42"), Some("c1"), "me", "hi"))
            .unwrap();
        assert_eq!(store.records().len(), 2);
        // Position preserved: the optimistic message is still first.
        assert_eq!(store.records()[0].id.as_deref(), Some("42"));
        assert_eq!(store.records()[1].id.as_deref(), Some("9"));
    }

    #[test]
    fn late_update_preserves_order() {
        let mut store = MessageStore::new();
        for id in ["a", "b", "c"] {
            store
                .apply_incoming(wire(Some(id), None, "peer", id))
                .unwrap();
        }
        let mut updated = wire(Some("b"), None, "peer", "b");
        updated
            .reactions
            .entry("👍".to_string())
            .or_default()
            .insert("peer".to_string());
        assert_eq!(store.apply_incoming(updated), Ok(ApplyOutcome::Updated));
        let ids: Vec<_> = store
            .records()
            .iter()
            .map(|r| r.id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(store.records()[1].reactions.contains_key("👍"));
    }

    #[test]
    fn out_of_order_echoes_keep_send_order() {
        // Two offline sends; echoes arrive reversed. Send order must hold.
        let mut store = MessageStore::new();
        store.append_optimistic(optimistic("c1", "me", "first"));
        store.append_optimistic(optimistic("c2", "me", "second"));
        store
            .apply_incoming(wire(Some("11"), Some("c2"), "me", "second"))
            .unwrap();
        store
            .apply_incoming(wire(Some("10"), Some("c1"), "me", "first"))
            .unwrap();
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.records()[0].text.as_deref(), Some("first"));
        assert_eq!(store.records()[0].id.as_deref(), Some("10"));
        assert_eq!(store.records()[1].text.as_deref(), Some("second"));
        assert_eq!(store.records()[1].id.as_deref(), Some("11"));
    }

    #[test]
    fn snapshot_then_replayed_delivery_dedupes() {
        let mut store = MessageStore::new();
        assert!(store.load_snapshot(vec![wire(Some("1"), None, "peer", "hello")]));
        store
            .apply_incoming(wire(Some("1"), None, "peer", "hello"))
            .unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn snapshot_after_live_data_is_a_no_op() {
        let mut store = MessageStore::new();
        store
            .apply_incoming(wire(Some("7"), None, "peer", "live"))
            .unwrap();
        assert!(!store.load_snapshot(vec![wire(Some("1"), None, "peer", "old")]));
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn malformed_record_is_rejected_not_fatal() {
        let mut store = MessageStore::new();
        let bad = WireMessage {
            sender_id: "peer".to_string(),
            text: Some("??".to_string()),
            ..WireMessage::default()
        };
        assert_eq!(
            store.apply_incoming(bad),
            Err(ReconcileError::MissingIdentifiers)
        );
        assert_eq!(store.rejected(), 1);
        // Stream keeps flowing.
        store
            .apply_incoming(wire(Some("1"), None, "peer", "ok"))
            .unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn seen_by_only_grows() {
        let mut store = MessageStore::new();
        let mut first = wire(Some("1"), None, "peer", "hi");
        first.seen_by.insert("u1".to_string());
        store.apply_incoming(first).unwrap();

        // Stale redelivery without u1 must not shrink the set.
        let mut stale = wire(Some("1"), None, "peer", "hi");
        stale.seen_by.insert("u2".to_string());
        store.apply_incoming(stale).unwrap();

        let seen = &store.records()[0].seen_by;
        assert!(seen.contains("u1"));
        assert!(seen.contains("u2"));
    }

    #[test]
    fn echo_before_local_append_keeps_uniqueness() {
        // Not expected from the backend, but must not duplicate or crash:
        // the echo appends under rule 3, the late local append is skipped.
        let mut store = MessageStore::new();
        store
            .apply_incoming(wire(Some("42"), Some("c1"), "me", "hi"))
            .unwrap();
        assert!(!store.append_optimistic(optimistic("c1", "me", "hi")));
        assert_eq!(store.records().len(), 1);
        assert!(store.is_confirmed("42"));
    }

    #[test]
    fn client_only_record_with_unknown_client_id_is_discarded() {
        let mut store = MessageStore::new();
        let outcome = store
            .apply_incoming(wire(None, Some("ghost"), "me", "??"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert!(store.is_empty());
    }
}
