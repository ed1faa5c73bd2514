use crate::state::{ChatState, ConnectionStatus, ConversationViewState};
use crate::ChatAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum ChatUpdate {
    FullState(ChatState),
    ConversationChanged {
        rev: u64,
        conversation: Option<ConversationViewState>,
    },
    ConnectionChanged {
        rev: u64,
        connection: ConnectionStatus,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },

    // One-shot gesture intents. Transient by design: they drive a view
    // action (compose-with-reply, picker, lightbox) rather than state.
    ReplyRequested {
        rev: u64,
        message_id: String,
    },
    ReactionPickerRequested {
        rev: u64,
        message_id: String,
    },
    MediaViewerRequested {
        rev: u64,
        message_id: String,
    },
}

impl ChatUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            ChatUpdate::FullState(s) => s.rev,
            ChatUpdate::ConversationChanged { rev, .. } => *rev,
            ChatUpdate::ConnectionChanged { rev, .. } => *rev,
            ChatUpdate::ToastChanged { rev, .. } => *rev,
            ChatUpdate::ReplyRequested { rev, .. } => *rev,
            ChatUpdate::ReactionPickerRequested { rev, .. } => *rev,
            ChatUpdate::MediaViewerRequested { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(ChatAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Inbound traffic re-entering from the host-owned transport. Raw JSON is
    // validated into a typed channel event at the connection boundary.
    ChannelEventReceived {
        conversation_id: String,
        payload_json: String,
    },
    SnapshotFetched {
        conversation_id: String,
        payload_json: String,
    },

    // Long-press timer expiry. Carries the gesture session token so a fire
    // after cancellation or disposal is a guarded no-op.
    LongPressFired {
        token: u64,
    },

    // Media pipeline completion for a gated media send.
    MediaPrepared {
        client_id: String,
        media_ref: Option<String>,
        error: Option<String>,
    },
}
