// src/poll_source.rs

//! Poll sources: the data the looper hands back for the glue's own
//! registrations, carrying the dispatch for that source.

use crate::app::App;
use crate::handler::AppHandler;

/// Looper identifier of the command pipe.
pub const LOOPER_ID_MAIN: i32 = 1;
/// Looper identifier of the input queue.
pub const LOOPER_ID_INPUT: i32 = 2;
/// First identifier available to application-defined sources.
pub const LOOPER_ID_USER: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSource {
    /// The command pipe is readable.
    Command,
    /// The input queue has events.
    Input,
}

impl PollSource {
    pub fn id(self) -> i32 {
        match self {
            PollSource::Command => LOOPER_ID_MAIN,
            PollSource::Input => LOOPER_ID_INPUT,
        }
    }

    /// Performs the standard processing for this source, calling into
    /// `handler`.
    pub fn process<H: AppHandler + ?Sized>(self, app: &mut App, handler: &mut H) {
        match self {
            PollSource::Command => app.process_command(handler),
            PollSource::Input => app.process_input(handler),
        }
    }
}
