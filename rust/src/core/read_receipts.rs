// Viewport-visibility driven read acknowledgements: exactly one receipt per
// qualifying message per session, in whatever order messages become visible.

use std::collections::HashSet;

use crate::core::store::MessageStore;

#[derive(Debug)]
pub(crate) struct ReadTracker {
    threshold: f32,
    /// Observed but not yet acknowledged; drains on flush.
    queued: Vec<String>,
    /// Acknowledged (or suppressed) for the lifetime of this session; a
    /// message in here is never observed again even if visibility toggles.
    acknowledged: HashSet<String>,
}

impl ReadTracker {
    pub(crate) fn new(threshold: f32) -> Self {
        Self {
            threshold,
            queued: Vec::new(),
            acknowledged: HashSet::new(),
        }
    }

    /// Records a visibility observation. Queues the message the first time
    /// its ratio crosses the threshold while it is a foreign message the
    /// local user has not already seen.
    pub(crate) fn observe(
        &mut self,
        message_id: &str,
        visibility_ratio: f32,
        store: &MessageStore,
        local_user_id: &str,
    ) -> bool {
        if visibility_ratio < self.threshold {
            return false;
        }
        if self.acknowledged.contains(message_id) {
            return false;
        }
        let Some(record) = store.get_by_id(message_id) else {
            // Unknown or still-pending message; pending is always local so
            // there is nothing to acknowledge.
            return false;
        };
        if record.sender_id == local_user_id {
            return false;
        }
        if record.seen_by.contains(local_user_id) {
            // Another device already reported this one; suppress for good.
            self.acknowledged.insert(message_id.to_string());
            return false;
        }
        if self.queued.iter().any(|id| id == message_id) {
            return false;
        }
        self.queued.push(message_id.to_string());
        true
    }

    /// Drains queued observations into acknowledgements to send. seen-by
    /// membership is re-checked at flush time, not only at observation time:
    /// a cross-device update may have landed in between.
    pub(crate) fn flush(&mut self, store: &MessageStore, local_user_id: &str) -> Vec<String> {
        let mut to_send = Vec::new();
        for message_id in self.queued.drain(..) {
            self.acknowledged.insert(message_id.clone());
            let already_seen = store
                .get_by_id(&message_id)
                .map(|r| r.seen_by.contains(local_user_id))
                .unwrap_or(true);
            if !already_seen {
                to_send.push(message_id);
            }
        }
        to_send
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::WireMessage;

    fn store_with(messages: Vec<WireMessage>) -> MessageStore {
        let mut store = MessageStore::new();
        assert!(store.load_snapshot(messages));
        store
    }

    fn foreign(id: &str) -> WireMessage {
        WireMessage {
            id: Some(id.to_string()),
            sender_id: "peer".to_string(),
            text: Some("hi".to_string()),
            timestamp: 1_700_000_000,
            ..WireMessage::default()
        }
    }

    #[test]
    fn observe_twice_acknowledges_once() {
        let store = store_with(vec![foreign("m1")]);
        let mut tracker = ReadTracker::new(0.7);
        assert!(tracker.observe("m1", 0.9, &store, "me"));
        assert!(!tracker.observe("m1", 0.9, &store, "me"));
        assert_eq!(tracker.flush(&store, "me"), vec!["m1".to_string()]);
        // Visibility toggling after the ack must not re-fire.
        assert!(!tracker.observe("m1", 1.0, &store, "me"));
        assert!(tracker.flush(&store, "me").is_empty());
    }

    #[test]
    fn below_threshold_does_not_qualify() {
        let store = store_with(vec![foreign("m1")]);
        let mut tracker = ReadTracker::new(0.7);
        assert!(!tracker.observe("m1", 0.5, &store, "me"));
        assert!(tracker.observe("m1", 0.7, &store, "me"));
    }

    #[test]
    fn own_messages_are_never_acknowledged() {
        let mut own = foreign("m1");
        own.sender_id = "me".to_string();
        let store = store_with(vec![own]);
        let mut tracker = ReadTracker::new(0.7);
        assert!(!tracker.observe("m1", 1.0, &store, "me"));
    }

    #[test]
    fn already_seen_via_other_device_is_suppressed() {
        let mut seen = foreign("m1");
        seen.seen_by.insert("me".to_string());
        let store = store_with(vec![seen]);
        let mut tracker = ReadTracker::new(0.7);
        assert!(!tracker.observe("m1", 1.0, &store, "me"));
        assert!(tracker.flush(&store, "me").is_empty());
    }

    #[test]
    fn cross_device_update_between_observe_and_flush_suppresses_send() {
        let mut store = store_with(vec![foreign("m1")]);
        let mut tracker = ReadTracker::new(0.7);
        assert!(tracker.observe("m1", 0.9, &store, "me"));

        let mut update = foreign("m1");
        update.seen_by.insert("me".to_string());
        store.apply_incoming(update).unwrap();

        assert!(tracker.flush(&store, "me").is_empty());
    }

    #[test]
    fn order_of_observation_does_not_matter() {
        let store = store_with(vec![foreign("m1"), foreign("m2"), foreign("m3")]);
        let mut tracker = ReadTracker::new(0.7);
        tracker.observe("m3", 0.8, &store, "me");
        tracker.observe("m1", 0.8, &store, "me");
        tracker.observe("m2", 0.8, &store, "me");
        let sent = tracker.flush(&store, "me");
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn queue_survives_until_flushed() {
        let store = store_with(vec![foreign("m1")]);
        let mut tracker = ReadTracker::new(0.7);
        tracker.observe("m1", 0.9, &store, "me");
        assert!(tracker.has_queued());
        assert_eq!(tracker.flush(&store, "me").len(), 1);
        assert!(!tracker.has_queued());
    }
}
