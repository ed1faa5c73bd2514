// Per-message pointer state machine. One physical contact resolves to at
// most one intent: reply drag, long-press reaction picker, double-tap heart,
// or a plain tap. The long-press timer lives in the actor; this module only
// hands out tokens and validates fires against them.

use crate::actions::PointerSource;
use crate::core::config::ChatConfig;

// Synthetic mouse events replayed after a physical touch arrive within a few
// hundred ms on every platform we target.
const MOUSE_SUPPRESS_AFTER_TOUCH_MS: i64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GesturePhase {
    Pressing,
    Dragging { horizontal: bool, rightward: bool },
    /// Long-press already emitted; the rest of the contact is inert.
    Fired,
}

/// Transient per-contact state. Owned exclusively by the controller and
/// destroyed on release or cancellation.
#[derive(Debug, Clone)]
struct GestureSession {
    token: u64,
    message_id: String,
    source: PointerSource,
    start_x: f32,
    start_y: f32,
    phase: GesturePhase,
    target_pending: bool,
}

/// What a completed contact resolved to. `Tap` carries no side effect here;
/// the actor maps it to a media-viewer request for confirmed media messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GestureOutcome {
    None,
    Tap { message_id: String },
    Reply { message_id: String },
    Heart { message_id: String },
}

#[derive(Debug)]
pub(crate) struct GestureController {
    double_tap_ms: i64,
    slop_px: f32,
    drag_px: f32,

    session: Option<GestureSession>,
    next_token: u64,
    /// Candidate for a double-tap: (message id, settle time). Expires after
    /// the double-tap window.
    last_tap: Option<(String, i64)>,
    touch_suppress_until_ms: i64,
}

impl GestureController {
    pub(crate) fn new(config: &ChatConfig) -> Self {
        Self {
            double_tap_ms: config.double_tap_ms,
            slop_px: config.touch_slop_px,
            drag_px: config.reply_drag_px,
            session: None,
            next_token: 0,
            last_tap: None,
            touch_suppress_until_ms: 0,
        }
    }

    /// Starts a session for a new contact. Returns the token to arm the
    /// long-press timer with, or None when no timer should be armed (pending
    /// target, suppressed mouse event, overlay already open).
    pub(crate) fn begin(
        &mut self,
        message_id: String,
        source: PointerSource,
        x: f32,
        y: f32,
        at_ms: i64,
        target_pending: bool,
        overlay_open: bool,
    ) -> Option<u64> {
        if overlay_open {
            // A competing overlay (reaction picker) owns the pointer.
            self.session = None;
            return None;
        }
        if source == PointerSource::Mouse && self.mouse_suppressed(at_ms) {
            return None;
        }
        if self.session.is_some() {
            tracing::debug!("pointer down with live session; replacing");
        }

        self.next_token = self.next_token.wrapping_add(1);
        let token = self.next_token;
        self.session = Some(GestureSession {
            token,
            message_id,
            source,
            start_x: x,
            start_y: y,
            phase: GesturePhase::Pressing,
            target_pending,
        });

        // Pending messages ignore interaction entirely, so there is nothing
        // a long-press could legally emit.
        if target_pending {
            None
        } else {
            Some(token)
        }
    }

    pub(crate) fn on_move(&mut self, x: f32, y: f32, _at_ms: i64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != GesturePhase::Pressing {
            return;
        }
        let dx = x - session.start_x;
        let dy = y - session.start_y;
        if dx.hypot(dy) > self.slop_px {
            // Crossing the slop cancels the long-press; the dominant axis is
            // locked at the crossing moment.
            session.phase = GesturePhase::Dragging {
                horizontal: dx.abs() >= dy.abs(),
                rightward: dx > 0.0,
            };
        }
    }

    pub(crate) fn on_up(&mut self, x: f32, y: f32, at_ms: i64) -> GestureOutcome {
        let Some(session) = self.session.take() else {
            return GestureOutcome::None;
        };
        if session.source == PointerSource::Touch {
            self.touch_suppress_until_ms = at_ms + MOUSE_SUPPRESS_AFTER_TOUCH_MS;
        }

        match session.phase {
            GesturePhase::Fired => GestureOutcome::None,
            GesturePhase::Dragging {
                horizontal: true,
                rightward: true,
            } => {
                let dx = x - session.start_x;
                if dx > self.drag_px && !session.target_pending {
                    GestureOutcome::Reply {
                        message_id: session.message_id,
                    }
                } else {
                    GestureOutcome::None
                }
            }
            // Vertical or leftward drags resolve to no intent: scrolling.
            GesturePhase::Dragging { .. } => GestureOutcome::None,
            GesturePhase::Pressing => self.settle_tap(session, at_ms),
        }
    }

    pub(crate) fn on_cancel(&mut self, at_ms: i64) {
        if let Some(session) = self.session.take() {
            if session.source == PointerSource::Touch {
                self.touch_suppress_until_ms = at_ms + MOUSE_SUPPRESS_AFTER_TOUCH_MS;
            }
        }
    }

    /// Long-press timer expiry. Stale tokens (cancelled, moved past slop,
    /// released, replaced) are guarded no-ops.
    pub(crate) fn on_long_press_fired(&mut self, token: u64) -> Option<String> {
        let session = self.session.as_mut()?;
        if session.token != token || session.phase != GesturePhase::Pressing {
            return None;
        }
        if session.target_pending {
            return None;
        }
        session.phase = GesturePhase::Fired;
        Some(session.message_id.clone())
    }

    fn settle_tap(&mut self, session: GestureSession, at_ms: i64) -> GestureOutcome {
        let double_tap = match self.last_tap.take() {
            Some((message_id, settled_at))
                if message_id == session.message_id
                    && at_ms - settled_at <= self.double_tap_ms =>
            {
                true
            }
            _ => false,
        };

        if double_tap {
            if session.target_pending {
                return GestureOutcome::None;
            }
            return GestureOutcome::Heart {
                message_id: session.message_id,
            };
        }

        self.last_tap = Some((session.message_id.clone(), at_ms));
        GestureOutcome::Tap {
            message_id: session.message_id,
        }
    }

    fn mouse_suppressed(&self, at_ms: i64) -> bool {
        if at_ms < self.touch_suppress_until_ms {
            return true;
        }
        // A same-contact mouse event while a touch session is open.
        matches!(
            self.session.as_ref(),
            Some(s) if s.source == PointerSource::Touch
        )
    }
}
