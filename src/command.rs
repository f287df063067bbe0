// src/command.rs

//! Lifecycle commands delivered from the platform callback thread to the
//! application thread.
//!
//! Each command travels over the command pipe as a single byte. The byte
//! values are the declaration order below and must not be reordered.

use crate::error::GlueError;

/// A lifecycle notification for the application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AppCommand {
    /// The input queue changed. After pre-processing, `App::input_queue`
    /// holds the new queue (or `None`).
    InputChanged = 0,
    /// A new window is ready. `App::window` holds it.
    InitWindow = 1,
    /// The current window is going away. `App::window` still holds it while
    /// the handler runs and is `None` after post-processing.
    TermWindow = 2,
    /// The current window was resized; redraw at the new size.
    WindowResized = 3,
    /// The window must be redrawn before post-processing completes.
    WindowRedrawNeeded = 4,
    /// The visible content area of the window changed.
    ContentRectChanged = 5,
    GainedFocus = 6,
    LostFocus = 7,
    /// The device configuration changed. `App::configuration` is refreshed.
    ConfigChanged = 8,
    /// The system is running low on memory.
    LowMemory = 9,
    Start = 10,
    Resume = 11,
    /// Produce a saved-state blob with `App::set_saved_state`.
    SaveState = 12,
    Pause = 13,
    Stop = 14,
    /// The activity is being destroyed; the application loop should exit.
    Destroy = 15,
}

impl AppCommand {
    /// Every command, in wire order.
    pub const ALL: [AppCommand; 16] = [
        AppCommand::InputChanged,
        AppCommand::InitWindow,
        AppCommand::TermWindow,
        AppCommand::WindowResized,
        AppCommand::WindowRedrawNeeded,
        AppCommand::ContentRectChanged,
        AppCommand::GainedFocus,
        AppCommand::LostFocus,
        AppCommand::ConfigChanged,
        AppCommand::LowMemory,
        AppCommand::Start,
        AppCommand::Resume,
        AppCommand::SaveState,
        AppCommand::Pause,
        AppCommand::Stop,
        AppCommand::Destroy,
    ];

    /// The byte written to the command pipe.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the callback thread blocks until the application thread has
    /// post-processed this command.
    ///
    /// `Destroy` is not listed: it waits for thread exit, not an ack.
    pub fn requires_ack(self) -> bool {
        matches!(
            self,
            AppCommand::InputChanged
                | AppCommand::TermWindow
                | AppCommand::WindowResized
                | AppCommand::WindowRedrawNeeded
                | AppCommand::SaveState
                | AppCommand::Pause
        )
    }
}

impl TryFrom<u8> for AppCommand {
    type Error = GlueError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        AppCommand::ALL
            .get(byte as usize)
            .copied()
            .ok_or(GlueError::UnknownCommand(byte))
    }
}

/// The activity state last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Started,
    Resumed,
    Paused,
    Stopped,
}

impl ActivityState {
    /// Maps the four activity-state commands; other commands yield `None`.
    pub fn from_command(cmd: AppCommand) -> Option<Self> {
        match cmd {
            AppCommand::Start => Some(ActivityState::Started),
            AppCommand::Resume => Some(ActivityState::Resumed),
            AppCommand::Pause => Some(ActivityState::Paused),
            AppCommand::Stop => Some(ActivityState::Stopped),
            _ => None,
        }
    }
}
