mod actions;
mod core;
mod logging;
mod state;
mod timeline;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::*;
pub use state::*;
pub use timeline::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait ChatReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: ChatUpdate);
}

/// Platform-side transport: the app owns its pub/sub client and HTTP stack;
/// Rust tells it when to open/close and hands it serialized payloads to send.
/// Inbound traffic re-enters through `FfiChat::deliver_channel_event` and
/// `FfiChat::deliver_snapshot`.
#[uniffi::export(callback_interface)]
pub trait TransportBridge: Send + Sync + 'static {
    fn open(&self, conversation_id: String, auth_token: String);
    fn fetch_snapshot(&self, conversation_id: String);
    fn send(&self, payload_json: String);
    fn close(&self, conversation_id: String);
}

/// Platform-side media pipeline. `prepare_media` uploads (or otherwise
/// stabilizes) a local file and reports back through
/// `FfiChat::media_prepared` with the same clientId.
#[uniffi::export(callback_interface)]
pub trait MediaBridge: Send + Sync + 'static {
    fn prepare_media(&self, client_id: String, local_ref: String);
}

pub(crate) type SharedTransportBridge = Arc<RwLock<Option<Arc<dyn TransportBridge>>>>;
pub(crate) type SharedMediaBridge = Arc<RwLock<Option<Arc<dyn MediaBridge>>>>;

#[derive(uniffi::Object)]
pub struct FfiChat {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<ChatUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<ChatState>>,
    transport_bridge: SharedTransportBridge,
    media_bridge: SharedMediaBridge,
}

#[uniffi::export]
impl FfiChat {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiChat::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(ChatState::empty()));
        let transport_bridge: SharedTransportBridge = Arc::new(RwLock::new(None));
        let media_bridge: SharedMediaBridge = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "chat actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let transport_for_core = transport_bridge.clone();
        let media_for_core = media_bridge.clone();
        thread::spawn(move || {
            let mut core = crate::core::ChatCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                transport_for_core,
                media_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            transport_bridge,
            media_bridge,
        })
    }

    pub fn state(&self) -> ChatState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn ChatReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_transport_bridge(&self, bridge: Box<dyn TransportBridge>) {
        let bridge: Arc<dyn TransportBridge> = Arc::from(bridge);
        match self.transport_bridge.write() {
            Ok(mut slot) => {
                *slot = Some(bridge);
            }
            Err(poison) => {
                *poison.into_inner() = Some(bridge);
            }
        }
    }

    pub fn set_media_bridge(&self, bridge: Box<dyn MediaBridge>) {
        let bridge: Arc<dyn MediaBridge> = Arc::from(bridge);
        match self.media_bridge.write() {
            Ok(mut slot) => {
                *slot = Some(bridge);
            }
            Err(poison) => {
                *poison.into_inner() = Some(bridge);
            }
        }
    }

    /// One raw event off the platform's live channel. Ordering within a
    /// conversation is the caller's responsibility; this call never blocks.
    pub fn deliver_channel_event(&self, conversation_id: String, payload_json: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::ChannelEventReceived {
                conversation_id,
                payload_json,
            },
        )));
    }

    /// The REST snapshot for a conversation, as a JSON array of messages.
    pub fn deliver_snapshot(&self, conversation_id: String, payload_json: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::SnapshotFetched {
                conversation_id,
                payload_json,
            },
        )));
    }

    /// Media pipeline completion for a pending send. Exactly one of
    /// `media_ref` / `error` should be set.
    pub fn media_prepared(
        &self,
        client_id: String,
        media_ref: Option<String>,
        error: Option<String>,
    ) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::MediaPrepared {
                client_id,
                media_ref,
                error,
            },
        )));
    }
}
