// src/handler.rs

use crate::app::App;
use crate::command::AppCommand;
use crate::input::InputEvent;

/// Application callbacks invoked on the application thread.
///
/// `handle_command` runs between the glue's pre- and post-processing of the
/// command, so `app` already reflects the new window, input queue, content
/// rect or activity state when it is called.
pub trait AppHandler {
    fn handle_command(&mut self, app: &mut App, cmd: AppCommand);

    /// Returns `true` if the event was handled. Unhandled events get the
    /// platform's default treatment.
    fn handle_input(&mut self, _app: &mut App, _event: &InputEvent) -> bool {
        false
    }
}
