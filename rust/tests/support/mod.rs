#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use muster_core::{ChatReconciler, ChatUpdate, MediaBridge, TransportBridge};

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, json: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("muster_config.json");
    std::fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<ChatUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            ChatUpdate::ToastChanged { toast, .. } => toast.clone(),
            _ => None,
        })
    }
}

impl ChatReconciler for Collector {
    fn reconcile(&self, update: ChatUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

/// Records every transport call; inbound traffic is injected by the test
/// through `FfiChat::deliver_channel_event` / `deliver_snapshot`.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub opened: Arc<Mutex<Vec<(String, String)>>>,
    pub snapshots_requested: Arc<Mutex<Vec<String>>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect()
    }

    pub fn sent_of_kind(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_json()
            .into_iter()
            .filter(|v| v["kind"] == kind)
            .collect()
    }
}

impl TransportBridge for MockTransport {
    fn open(&self, conversation_id: String, auth_token: String) {
        self.opened.lock().unwrap().push((conversation_id, auth_token));
    }

    fn fetch_snapshot(&self, conversation_id: String) {
        self.snapshots_requested.lock().unwrap().push(conversation_id);
    }

    fn send(&self, payload_json: String) {
        self.sent.lock().unwrap().push(payload_json);
    }

    fn close(&self, conversation_id: String) {
        self.closed.lock().unwrap().push(conversation_id);
    }
}

#[derive(Clone, Default)]
pub struct MockMedia {
    pub prepared: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBridge for MockMedia {
    fn prepare_media(&self, client_id: String, local_ref: String) {
        self.prepared.lock().unwrap().push((client_id, local_ref));
    }
}
