use std::path::Path;

use serde::Deserialize;

// Empirically tuned interaction thresholds. These are tuning knobs, not
// load-bearing constants; shells can override any of them via
// `muster_config.json` in the data dir.
const DEFAULT_LONG_PRESS_MS: u64 = 325;
const DEFAULT_DOUBLE_TAP_MS: i64 = 300;
const DEFAULT_TOUCH_SLOP_PX: f32 = 10.0;
const DEFAULT_REPLY_DRAG_PX: f32 = 50.0;
const DEFAULT_READ_VISIBILITY_RATIO: f32 = 0.7;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ChatConfig {
    pub(crate) long_press_ms: u64,
    pub(crate) double_tap_ms: i64,
    pub(crate) touch_slop_px: f32,
    pub(crate) reply_drag_px: f32,
    pub(crate) read_visibility_ratio: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            long_press_ms: DEFAULT_LONG_PRESS_MS,
            double_tap_ms: DEFAULT_DOUBLE_TAP_MS,
            touch_slop_px: DEFAULT_TOUCH_SLOP_PX,
            reply_drag_px: DEFAULT_REPLY_DRAG_PX,
            read_visibility_ratio: DEFAULT_READ_VISIBILITY_RATIO,
        }
    }
}

pub(crate) fn load_chat_config(data_dir: &str) -> ChatConfig {
    let path = Path::new(data_dir).join("muster_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return ChatConfig::default();
    };
    serde_json::from_slice::<ChatConfig>(&bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_chat_config(&dir.path().to_string_lossy());
        assert_eq!(config.long_press_ms, DEFAULT_LONG_PRESS_MS);
        assert_eq!(config.read_visibility_ratio, DEFAULT_READ_VISIBILITY_RATIO);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("muster_config.json"),
            br#"{"long_press_ms": 500}"#,
        )
        .unwrap();
        let config = load_chat_config(&dir.path().to_string_lossy());
        assert_eq!(config.long_press_ms, 500);
        assert_eq!(config.double_tap_ms, DEFAULT_DOUBLE_TAP_MS);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("muster_config.json"), b"not-json").unwrap();
        let config = load_chat_config(&dir.path().to_string_lossy());
        assert_eq!(config.reply_drag_px, DEFAULT_REPLY_DRAG_PX);
    }
}
