// src/error.rs

//! Error types for the activity glue.
//!
//! Setup paths and host-facing operations return `anyhow::Result` and wrap
//! these with context. Framing errors on the command pipe never surface as
//! values past [`crate::channel`]: they abort the process there.

use std::io;
use std::time::Duration;

/// Failures the glue can report to its caller.
#[derive(Debug)]
pub enum GlueError {
    /// I/O on the command pipe failed.
    Pipe(io::Error),
    /// A write to the command pipe transferred fewer bytes than one command.
    ShortWrite { written: usize },
    /// The command pipe was closed by the other end.
    ChannelClosed,
    /// A byte read from the command pipe does not name a command.
    UnknownCommand(u8),
    /// The application thread did not exit within the configured bound.
    DestroyTimeout { waited: Duration },
    /// The application thread exited before it reported running.
    ApplicationExited,
}

impl std::fmt::Display for GlueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlueError::Pipe(e) => write!(f, "command pipe I/O failed: {}", e),
            GlueError::ShortWrite { written } => {
                write!(f, "short write on command pipe ({} bytes)", written)
            }
            GlueError::ChannelClosed => write!(f, "command pipe closed"),
            GlueError::UnknownCommand(byte) => {
                write!(f, "unknown command byte {:#04x} on command pipe", byte)
            }
            GlueError::DestroyTimeout { waited } => write!(
                f,
                "application thread did not exit within {} ms of DESTROY",
                waited.as_millis()
            ),
            GlueError::ApplicationExited => {
                write!(f, "application thread exited before reporting running")
            }
        }
    }
}

impl std::error::Error for GlueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GlueError::Pipe(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GlueError {
    fn from(err: io::Error) -> Self {
        GlueError::Pipe(err)
    }
}
