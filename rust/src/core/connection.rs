// Connection lifecycle + the typed boundary around the host-owned transport.
//
// The pub/sub channel and REST fetch belong to the surrounding app; this
// module owns when they are opened/closed, validates their raw JSON into a
// closed tagged union before reconciliation sees it, and serializes outgoing
// intents.

use super::*;

use serde::{Deserialize, Serialize};

/// Everything the live channel can deliver, validated at this boundary so
/// reconciliation operates on typed, exhaustively-matched values.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum ChannelEvent {
    NewMessage { message: WireMessage },
    UpdateMessage { message: WireMessage },
    ConnectionState {
        state: ChannelState,
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ChannelState {
    Ready,
    Failed,
    Closed,
}

pub(crate) fn parse_channel_event(payload_json: &str) -> anyhow::Result<ChannelEvent> {
    Ok(serde_json::from_str(payload_json)?)
}

/// Outgoing intents. Fire-and-forget: success for new messages is observed
/// only through a later channel echo carrying the same clientId.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum SendIntent {
    Message {
        conversation_id: String,
        client_id: String,
        text: Option<String>,
        media_ref: Option<String>,
        parent_id: Option<String>,
    },
    Reaction {
        message_id: String,
        reaction: String,
    },
    ReadReceipt {
        message_id: String,
    },
}

/// A media send waiting on the external pipeline for its stable mediaRef.
#[derive(Debug, Clone)]
pub(crate) struct PendingMediaSend {
    pub(crate) parent_id: Option<String>,
}

/// State for the one live conversation. Dropped synchronously on close, so
/// any event still queued for it is discarded by the conversation check in
/// `handle_channel_event`.
pub(crate) struct ChatSession {
    pub(crate) conversation_id: String,
    pub(crate) local_user_id: String,
    pub(crate) status: ConnectionStatus,
    pub(crate) store: MessageStore,
    pub(crate) reads: ReadTracker,
    pub(crate) gestures: GestureController,
    pub(crate) overlay_open: bool,
    /// clientId -> original message intent, kept until the echo confirms it
    /// so a retry re-sends under the same idempotency token.
    pub(crate) outbox: HashMap<String, SendIntent>,
    pub(crate) pending_media: HashMap<String, PendingMediaSend>,
}

impl ChatCore {
    pub(super) fn open_session(
        &mut self,
        conversation_id: String,
        local_user_id: String,
        auth_token: String,
    ) {
        // At most one live subscription: tear down any existing session first.
        self.close_session();

        tracing::info!(conversation_id = %conversation_id, "open_session");

        self.session = Some(ChatSession {
            conversation_id: conversation_id.clone(),
            local_user_id,
            status: ConnectionStatus::Connecting,
            store: MessageStore::new(),
            reads: ReadTracker::new(self.config.read_visibility_ratio),
            gestures: GestureController::new(&self.config),
            overlay_open: false,
            outbox: HashMap::new(),
            pending_media: HashMap::new(),
        });

        match self.transport() {
            Some(transport) => {
                transport.open(conversation_id.clone(), auth_token);
                transport.fetch_snapshot(conversation_id);
            }
            None => {
                if let Some(sess) = self.session.as_mut() {
                    sess.status = ConnectionStatus::Failed {
                        reason: "no transport bridge".to_string(),
                    };
                }
                self.toast("No transport configured");
            }
        }

        self.refresh_conversation();
    }

    /// Synchronous from the actor's perspective: the session is gone before
    /// this returns, so no later event can touch a discarded store.
    pub(super) fn close_session(&mut self) {
        if let Some(sess) = self.session.take() {
            tracing::info!(conversation_id = %sess.conversation_id, "close_session");
            if let Some(transport) = self.transport() {
                transport.close(sess.conversation_id);
            }
        }
    }

    pub(super) fn transport(&self) -> Option<Arc<dyn TransportBridge>> {
        match self.transport_bridge.read() {
            Ok(slot) => slot.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub(super) fn media(&self) -> Option<Arc<dyn MediaBridge>> {
        match self.media_bridge.read() {
            Ok(slot) => slot.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Sends one intent through the live channel. Sends before the session
    /// is ready are dropped and reported, not queued.
    pub(super) fn send_intent(&self, intent: &SendIntent) -> Result<(), String> {
        let Some(sess) = self.session.as_ref() else {
            return Err("no active conversation".to_string());
        };
        if !sess.status.is_ready() {
            return Err("connection not ready".to_string());
        }
        let Some(transport) = self.transport() else {
            return Err("no transport bridge".to_string());
        };
        let payload = serde_json::to_string(intent)
            .map_err(|e| format!("intent serialization failed: {e}"))?;
        transport.send(payload);
        Ok(())
    }

    pub(super) fn handle_channel_event(&mut self, conversation_id: String, payload_json: String) {
        let Some(active) = self
            .session
            .as_ref()
            .map(|s| s.conversation_id.clone())
        else {
            tracing::debug!("channel event with no session dropped");
            return;
        };
        if active != conversation_id {
            tracing::debug!(conversation_id = %conversation_id, "channel event for closed conversation dropped");
            return;
        }

        let event = match parse_channel_event(&payload_json) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%e, "malformed channel event dropped");
                return;
            }
        };

        match event {
            ChannelEvent::NewMessage { message } | ChannelEvent::UpdateMessage { message } => {
                self.apply_wire_message(message);
            }
            ChannelEvent::ConnectionState { state, reason } => {
                self.handle_connection_state(state, reason);
            }
        }
    }

    fn handle_connection_state(&mut self, state: ChannelState, reason: Option<String>) {
        let status = match state {
            ChannelState::Ready => ConnectionStatus::Ready,
            ChannelState::Failed => ConnectionStatus::Failed {
                reason: reason.unwrap_or_else(|| "connection failed".to_string()),
            },
            ChannelState::Closed => ConnectionStatus::Closed,
        };
        tracing::info!(?status, "connection_state");

        if let Some(sess) = self.session.as_mut() {
            sess.status = status.clone();
        }
        if let Some(conv) = self.state.conversation.as_mut() {
            conv.connection = status.clone();
        }
        self.emit_connection(status.clone());

        match status {
            ConnectionStatus::Ready => {
                // Observations queued while offline drain now.
                self.flush_read_receipts();
            }
            ConnectionStatus::Failed { reason } => {
                // Degrade to "no live updates"; the reconciled message list
                // stays intact.
                self.toast(format!("Live updates unavailable: {reason}"));
            }
            _ => {}
        }
    }

    /// One message-shaped record off the channel, new or update; the store's
    /// reconciliation decides which.
    pub(super) fn apply_wire_message(&mut self, wire: WireMessage) {
        let client_id = wire.client_id.clone();
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let outcome = match sess.store.apply_incoming(wire) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%e, rejected = sess.store.rejected(), "incoming message rejected");
                return;
            }
        };
        tracing::debug!(?outcome, "apply_incoming");

        if outcome == ApplyOutcome::ResolvedOptimistic {
            if let Some(client_id) = client_id {
                sess.outbox.remove(&client_id);
                sess.pending_media.remove(&client_id);
                sess.store
                    .set_delivery(&client_id, MessageDeliveryState::Sent);
            }
        }

        self.refresh_conversation();
    }

    pub(super) fn handle_snapshot(&mut self, conversation_id: String, payload_json: String) {
        let Some(active) = self
            .session
            .as_ref()
            .map(|s| s.conversation_id.clone())
        else {
            tracing::debug!("snapshot with no session dropped");
            return;
        };
        if active != conversation_id {
            tracing::debug!(conversation_id = %conversation_id, "snapshot for closed conversation dropped");
            return;
        }

        let messages: Vec<WireMessage> = match serde_json::from_str(&payload_json) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(%e, "malformed snapshot");
                self.toast("Couldn't load messages");
                return;
            }
        };

        let loaded = self
            .session
            .as_mut()
            .map(|sess| sess.store.load_snapshot(messages))
            .unwrap_or(false);
        if loaded {
            self.refresh_conversation();
        }
    }

    pub(super) fn flush_read_receipts(&mut self) {
        let to_send = {
            let Some(sess) = self.session.as_mut() else {
                return;
            };
            if !sess.status.is_ready() || !sess.reads.has_queued() {
                return;
            }
            let local = sess.local_user_id.clone();
            sess.reads.flush(&sess.store, &local)
        };
        for message_id in to_send {
            let intent = SendIntent::ReadReceipt {
                message_id: message_id.clone(),
            };
            if let Err(reason) = self.send_intent(&intent) {
                // The tracker already marked it acknowledged; a lost receipt
                // is recovered by the backend's own read reconciliation.
                tracing::warn!(%message_id, reason, "read receipt dropped");
            }
        }
    }
}
