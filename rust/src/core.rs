use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::ChatAction;
use crate::state::{
    now_seconds, ChatMessage, ChatState, ConnectionStatus, ConversationViewState,
    MessageDeliveryState, ReactionSummary,
};
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};
use crate::{MediaBridge, SharedMediaBridge, SharedTransportBridge, TransportBridge};

mod config;
mod connection;
mod gesture;
mod read_receipts;
mod store;

use config::{load_chat_config, ChatConfig};
use connection::{ChatSession, PendingMediaSend, SendIntent};
use gesture::{GestureController, GestureOutcome};
use read_receipts::ReadTracker;
use store::{ApplyOutcome, MessageRecord, MessageStore, WireMessage};

const HEART_REACTION: &str = "❤️";

pub struct ChatCore {
    pub state: ChatState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<ChatUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<ChatState>>,

    config: ChatConfig,
    runtime: tokio::runtime::Runtime,

    session: Option<ChatSession>,
    transport_bridge: SharedTransportBridge,
    media_bridge: SharedMediaBridge,
}

impl ChatCore {
    pub fn new(
        update_sender: Sender<ChatUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<ChatState>>,
        transport_bridge: SharedTransportBridge,
        media_bridge: SharedMediaBridge,
    ) -> Self {
        let config = load_chat_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: ChatState::empty(),
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            session: None,
            transport_bridge,
            media_bridge,
        };

        // Ensure FfiChat.state() has an immediately-available snapshot.
        this.commit_state();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: ChatUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_conversation(&mut self) {
        let rev = self.next_rev();
        self.emit(ChatUpdate::ConversationChanged {
            rev,
            conversation: self.state.conversation.clone(),
        });
    }

    fn emit_connection(&mut self, connection: ConnectionStatus) {
        let rev = self.next_rev();
        self.emit(ChatUpdate::ConnectionChanged { rev, connection });
    }

    fn emit_toast(&mut self) {
        let rev = self.next_rev();
        self.emit(ChatUpdate::ToastChanged {
            rev,
            toast: self.state.toast.clone(),
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a snapshot
        // resync still contains it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChannelEventReceived {
                conversation_id,
                payload_json,
            } => self.handle_channel_event(conversation_id, payload_json),
            InternalEvent::SnapshotFetched {
                conversation_id,
                payload_json,
            } => self.handle_snapshot(conversation_id, payload_json),
            InternalEvent::LongPressFired { token } => {
                let fired = self
                    .session
                    .as_mut()
                    .and_then(|sess| sess.gestures.on_long_press_fired(token));
                if let Some(message_id) = fired {
                    let rev = self.next_rev();
                    self.emit(ChatUpdate::ReactionPickerRequested { rev, message_id });
                }
            }
            InternalEvent::MediaPrepared {
                client_id,
                media_ref,
                error,
            } => self.handle_media_prepared(client_id, media_ref, error),
        }
    }

    fn handle_action(&mut self, action: ChatAction) {
        match action {
            ChatAction::OpenConversation {
                conversation_id,
                local_user_id,
                auth_token,
            } => {
                self.open_session(conversation_id, local_user_id, auth_token);
                // Full baseline for a subscriber that attached mid-stream.
                self.next_rev();
                let snapshot = self.state.clone();
                self.emit(ChatUpdate::FullState(snapshot));
            }
            ChatAction::CloseConversation => {
                self.close_session();
                if self.state.conversation.is_some() {
                    self.state.conversation = None;
                    self.emit_conversation();
                }
            }

            ChatAction::SendMessage { text, parent_id } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return;
                }
                let Some(client_id) = self.append_outgoing(Some(text.clone()), None, &parent_id)
                else {
                    return;
                };
                let conversation_id = self
                    .session
                    .as_ref()
                    .map(|s| s.conversation_id.clone())
                    .unwrap_or_default();
                let intent = SendIntent::Message {
                    conversation_id,
                    client_id: client_id.clone(),
                    text: Some(text),
                    media_ref: None,
                    parent_id,
                };
                if let Some(sess) = self.session.as_mut() {
                    sess.outbox.insert(client_id.clone(), intent);
                }
                self.try_send_outgoing(&client_id);
                self.refresh_conversation();
            }

            ChatAction::SendMediaMessage {
                local_ref,
                parent_id,
            } => {
                // The message renders immediately against the local file; the
                // send itself is gated on the media pipeline returning a
                // stable reference.
                let Some(client_id) =
                    self.append_outgoing(None, Some(local_ref.clone()), &parent_id)
                else {
                    return;
                };
                let Some(media) = self.media() else {
                    if let Some(sess) = self.session.as_mut() {
                        sess.store.set_delivery(
                            &client_id,
                            MessageDeliveryState::Failed {
                                reason: "no media pipeline".to_string(),
                            },
                        );
                    }
                    self.toast("Media uploads unavailable");
                    self.refresh_conversation();
                    return;
                };
                if let Some(sess) = self.session.as_mut() {
                    sess.pending_media
                        .insert(client_id.clone(), PendingMediaSend { parent_id });
                }
                media.prepare_media(client_id, local_ref);
                self.refresh_conversation();
            }

            ChatAction::RetryMessage { client_id } => {
                let has_intent = self
                    .session
                    .as_ref()
                    .map(|s| s.outbox.contains_key(&client_id))
                    .unwrap_or(false);
                if !has_intent {
                    self.toast("Nothing to retry");
                    return;
                }
                self.try_send_outgoing(&client_id);
                self.refresh_conversation();
            }

            ChatAction::SendReaction {
                message_id,
                reaction,
            } => {
                let confirmed = self
                    .session
                    .as_ref()
                    .map(|s| s.store.is_confirmed(&message_id))
                    .unwrap_or(false);
                if !confirmed {
                    return;
                }
                let intent = SendIntent::Reaction {
                    message_id,
                    reaction,
                };
                if let Err(reason) = self.send_intent(&intent) {
                    self.toast(format!("Reaction failed: {reason}"));
                }
            }

            ChatAction::MessageVisible {
                message_id,
                visibility_ratio,
            } => {
                let ready = {
                    let Some(sess) = self.session.as_mut() else {
                        return;
                    };
                    let local = sess.local_user_id.clone();
                    sess.reads
                        .observe(&message_id, visibility_ratio, &sess.store, &local);
                    sess.status.is_ready()
                };
                if ready {
                    self.flush_read_receipts();
                }
            }

            ChatAction::PointerDown {
                message_id,
                source,
                x,
                y,
                at_ms,
            } => {
                let token = {
                    let Some(sess) = self.session.as_mut() else {
                        return;
                    };
                    let target_pending = !sess.store.is_confirmed(&message_id);
                    let overlay_open = sess.overlay_open;
                    sess.gestures
                        .begin(message_id, source, x, y, at_ms, target_pending, overlay_open)
                };
                if let Some(token) = token {
                    self.arm_long_press_timer(token);
                }
            }
            ChatAction::PointerMove { x, y, at_ms } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.gestures.on_move(x, y, at_ms);
                }
            }
            ChatAction::PointerUp { x, y, at_ms } => {
                let outcome = match self.session.as_mut() {
                    Some(sess) => sess.gestures.on_up(x, y, at_ms),
                    None => return,
                };
                self.resolve_gesture(outcome);
            }
            ChatAction::PointerCancel { at_ms } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.gestures.on_cancel(at_ms);
                }
            }
            ChatAction::SetOverlayOpen { open } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.overlay_open = open;
                }
            }

            ChatAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }
        }
    }

    /// Appends an optimistic message and returns its fresh clientId, or None
    /// when there is no active conversation.
    fn append_outgoing(
        &mut self,
        text: Option<String>,
        media_ref: Option<String>,
        parent_id: &Option<String>,
    ) -> Option<String> {
        // Backend timestamps are second-granularity; rapid sends can share a
        // second. Keep outgoing timestamps monotonic so ties cannot reorder.
        let timestamp = {
            let now = now_seconds();
            if now <= self.last_outgoing_ts {
                self.last_outgoing_ts += 1;
            } else {
                self.last_outgoing_ts = now;
            }
            self.last_outgoing_ts
        };

        let Some(sess) = self.session.as_mut() else {
            self.toast("No active conversation");
            return None;
        };
        let client_id = uuid::Uuid::new_v4().to_string();
        let record = MessageRecord {
            id: None,
            client_id: Some(client_id.clone()),
            sender_id: sess.local_user_id.clone(),
            text,
            media_ref,
            timestamp,
            reactions: Default::default(),
            seen_by: Default::default(),
            parent_id: parent_id.clone(),
            delivery: MessageDeliveryState::Pending,
        };
        if !sess.store.append_optimistic(record) {
            return None;
        }
        Some(client_id)
    }

    /// Attempts to push the outbox intent for `client_id` through the live
    /// channel; a drop (not ready, no transport) marks the message failed so
    /// the user can retry it.
    fn try_send_outgoing(&mut self, client_id: &str) {
        let intent = self
            .session
            .as_ref()
            .and_then(|s| s.outbox.get(client_id).cloned());
        let Some(intent) = intent else {
            return;
        };
        match self.send_intent(&intent) {
            Ok(()) => {
                if let Some(sess) = self.session.as_mut() {
                    sess.store
                        .set_delivery(client_id, MessageDeliveryState::Pending);
                }
            }
            Err(reason) => {
                if let Some(sess) = self.session.as_mut() {
                    sess.store.set_delivery(
                        client_id,
                        MessageDeliveryState::Failed {
                            reason: reason.clone(),
                        },
                    );
                }
                self.toast(format!("Send failed: {reason}"));
            }
        }
    }

    fn handle_media_prepared(
        &mut self,
        client_id: String,
        media_ref: Option<String>,
        error: Option<String>,
    ) {
        let pending = self
            .session
            .as_mut()
            .and_then(|s| s.pending_media.remove(&client_id));
        let Some(pending) = pending else {
            tracing::debug!(%client_id, "media result for unknown or closed send dropped");
            return;
        };

        match media_ref {
            Some(media_ref) => {
                let conversation_id = self
                    .session
                    .as_ref()
                    .map(|s| s.conversation_id.clone())
                    .unwrap_or_default();
                let intent = SendIntent::Message {
                    conversation_id,
                    client_id: client_id.clone(),
                    text: None,
                    media_ref: Some(media_ref.clone()),
                    parent_id: pending.parent_id,
                };
                if let Some(sess) = self.session.as_mut() {
                    sess.store.set_media_ref(&client_id, media_ref);
                    sess.outbox.insert(client_id.clone(), intent);
                }
                self.try_send_outgoing(&client_id);
            }
            None => {
                let reason = error.unwrap_or_else(|| "media preparation failed".to_string());
                if let Some(sess) = self.session.as_mut() {
                    sess.store.set_delivery(
                        &client_id,
                        MessageDeliveryState::Failed {
                            reason: reason.clone(),
                        },
                    );
                }
                self.toast(format!("Media send failed: {reason}"));
            }
        }
        self.refresh_conversation();
    }

    fn arm_long_press_timer(&mut self, token: u64) {
        let delay = Duration::from_millis(self.config.long_press_ms);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::LongPressFired {
                token,
            })));
        });
    }

    fn resolve_gesture(&mut self, outcome: GestureOutcome) {
        match outcome {
            GestureOutcome::None => {}
            GestureOutcome::Reply { message_id } => {
                let rev = self.next_rev();
                self.emit(ChatUpdate::ReplyRequested { rev, message_id });
            }
            GestureOutcome::Heart { message_id } => {
                let intent = SendIntent::Reaction {
                    message_id,
                    reaction: HEART_REACTION.to_string(),
                };
                if let Err(reason) = self.send_intent(&intent) {
                    // A missed gesture is recoverable by repeating it; never
                    // surface it as an error.
                    tracing::debug!(reason, "heart reaction dropped");
                }
            }
            GestureOutcome::Tap { message_id } => {
                let has_media = self
                    .session
                    .as_ref()
                    .and_then(|s| s.store.get_by_id(&message_id))
                    .map(|r| r.media_ref.is_some())
                    .unwrap_or(false);
                if has_media {
                    let rev = self.next_rev();
                    self.emit(ChatUpdate::MediaViewerRequested { rev, message_id });
                }
            }
        }
    }

    /// Rebuilds the conversation view from the store and emits it.
    fn refresh_conversation(&mut self) {
        let view = self.session.as_ref().map(|sess| ConversationViewState {
            conversation_id: sess.conversation_id.clone(),
            local_user_id: sess.local_user_id.clone(),
            connection: sess.status.clone(),
            messages: sess
                .store
                .records()
                .iter()
                .map(|record| project_message(record, &sess.local_user_id))
                .collect(),
        });
        self.state.conversation = view;
        self.emit_conversation();
    }
}

fn project_message(record: &MessageRecord, local_user_id: &str) -> ChatMessage {
    ChatMessage {
        id: record.id.clone(),
        client_id: record.client_id.clone(),
        sender_id: record.sender_id.clone(),
        text: record.text.clone(),
        media_ref: record.media_ref.clone(),
        timestamp: record.timestamp,
        reactions: record
            .reactions
            .iter()
            .map(|(emoji, users)| ReactionSummary {
                emoji: emoji.clone(),
                count: users.len() as u32,
                reacted_by_me: users.contains(local_user_id),
            })
            .collect(),
        seen_by: record.seen_by.iter().cloned().collect(),
        parent_id: record.parent_id.clone(),
        is_mine: record.sender_id == local_user_id,
        delivery: record.delivery.clone(),
    }
}
