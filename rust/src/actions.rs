/// Raw input source for a pointer contact. Touch-originated sessions suppress
/// the synthetic mouse events platforms replay for the same physical contact.
#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    Touch,
    Mouse,
}

#[derive(uniffi::Enum, Debug, Clone)]
pub enum ChatAction {
    // Conversation lifecycle
    OpenConversation {
        conversation_id: String,
        local_user_id: String,
        auth_token: String,
    },
    CloseConversation,

    // Sending
    SendMessage {
        text: String,
        parent_id: Option<String>,
    },
    SendMediaMessage {
        local_ref: String,
        parent_id: Option<String>,
    },
    RetryMessage {
        client_id: String,
    },
    SendReaction {
        message_id: String,
        reaction: String,
    },

    // Read tracking. Native reports viewport visibility per message; Rust
    // owns the exactly-once acknowledgement discipline.
    MessageVisible {
        message_id: String,
        visibility_ratio: f32,
    },

    // Gestures. Native sends raw pointer signals as actions; Rust owns all
    // state changes and emits at most one intent per completed contact.
    PointerDown {
        message_id: String,
        source: PointerSource,
        x: f32,
        y: f32,
        at_ms: i64,
    },
    PointerMove {
        x: f32,
        y: f32,
        at_ms: i64,
    },
    PointerUp {
        x: f32,
        y: f32,
        at_ms: i64,
    },
    PointerCancel {
        at_ms: i64,
    },
    SetOverlayOpen {
        open: bool,
    },

    // UI
    ClearToast,
}

impl ChatAction {
    /// Log-safe action tag (never includes message text or auth tokens).
    pub fn tag(&self) -> &'static str {
        match self {
            ChatAction::OpenConversation { .. } => "OpenConversation",
            ChatAction::CloseConversation => "CloseConversation",
            ChatAction::SendMessage { .. } => "SendMessage",
            ChatAction::SendMediaMessage { .. } => "SendMediaMessage",
            ChatAction::RetryMessage { .. } => "RetryMessage",
            ChatAction::SendReaction { .. } => "SendReaction",
            ChatAction::MessageVisible { .. } => "MessageVisible",
            ChatAction::PointerDown { .. } => "PointerDown",
            ChatAction::PointerMove { .. } => "PointerMove",
            ChatAction::PointerUp { .. } => "PointerUp",
            ChatAction::PointerCancel { .. } => "PointerCancel",
            ChatAction::SetOverlayOpen { .. } => "SetOverlayOpen",
            ChatAction::ClearToast => "ClearToast",
        }
    }
}
