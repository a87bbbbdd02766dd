//! Unified event type for the console loop.
//!
//! Session link tasks, the control link task and blocking-pool decode jobs
//! each report on their own queue. The `select!` loop in
//! [`Console::run`](super::Console::run) turns whichever is ready into a
//! [`ConsoleEvent`] and hands it to
//! [`Console::handle_event`](super::Console::handle_event).

// Rust guideline compliant 2026-02

use crate::frame_sink::DecodeOutcome;
use crate::link::LinkEvent;
use crate::protocol::ControlEvent;
use crate::session::SessionEvent;

/// Event from a background producer delivered to the console loop.
#[derive(Debug)]
pub enum ConsoleEvent {
    /// Camera session event, tagged with its session id.
    Session(SessionEvent),

    /// Control channel event, in arrival order.
    Control(LinkEvent<ControlEvent>),

    /// Background frame decode finished.
    Decoded(DecodeOutcome),
}

impl ConsoleEvent {
    /// Short name for trace logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session(_) => "session",
            Self::Control(_) => "control",
            Self::Decoded(_) => "decoded",
        }
    }
}
