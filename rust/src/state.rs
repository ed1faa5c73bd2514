#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatState {
    pub rev: u64,
    pub conversation: Option<ConversationViewState>,
    pub toast: Option<String>,
}

impl ChatState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            conversation: None,
            toast: None,
        }
    }
}

/// Connection lifecycle for the live channel of the active conversation.
///
/// `Failed`/`Closed` degrade to "no live updates": the already-reconciled
/// message list is preserved, only the status changes.
#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Failed { reason: String },
    Closed,
}

impl ConnectionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub local_user_id: String,
    pub connection: ConnectionStatus,
    pub messages: Vec<ChatMessage>,
}

/// One rendered message. `id` is the server identifier and is absent while
/// the message is an unconfirmed optimistic send; `client_id` is present only
/// on messages this client originated and survives confirmation. Native list
/// keys fall back to `client_id` when `id` is absent.
#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub client_id: Option<String>,
    pub sender_id: String,
    pub text: Option<String>,
    pub media_ref: Option<String>,
    pub timestamp: i64,
    pub reactions: Vec<ReactionSummary>,
    pub seen_by: Vec<String>,
    pub parent_id: Option<String>,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

impl ChatMessage {
    /// Confirmed once the server has assigned an id; never regresses.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
