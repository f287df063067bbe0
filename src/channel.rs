// src/channel.rs

//! The command channel: a pipe carrying one byte per [`AppCommand`] from the
//! platform callback thread to the application thread.
//!
//! The protocol has no resynchronization. A short write, an unknown byte or a
//! closed pipe means the two threads no longer agree on the command stream,
//! so [`CommandSender::write_command`] and [`CommandReceiver::read_command`]
//! abort the process on any of them. The `try_` variants report the same
//! conditions as values.

use crate::command::AppCommand;
use crate::error::GlueError;
use crate::os::pipe::Pipe;
use anyhow::Result;
use log::{error, trace};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bytes written and read on one channel.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    written: AtomicU64,
    read: AtomicU64,
}

impl ChannelCounters {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Acquire)
    }
}

/// Creates a connected sender/receiver pair.
pub fn command_channel() -> Result<(CommandSender, CommandReceiver)> {
    let Pipe { reader, writer } = Pipe::new()?;
    let counters = Arc::new(ChannelCounters::default());
    Ok((
        CommandSender {
            pipe: writer,
            counters: counters.clone(),
        },
        CommandReceiver {
            pipe: reader,
            counters,
        },
    ))
}

/// Repeats `op` while it fails with `Interrupted`.
fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("Command pipe I/O interrupted, retrying");
            }
            result => return result,
        }
    }
}

pub(crate) fn fatal(err: GlueError) -> ! {
    error!("Command channel desynchronized: {}. Aborting.", err);
    std::process::abort()
}

/// Callback-thread end of the channel.
#[derive(Debug)]
pub struct CommandSender {
    pipe: File,
    counters: Arc<ChannelCounters>,
}

impl CommandSender {
    /// Writes one command. Never blocks on the reader beyond pipe capacity.
    pub fn try_write_command(&self, cmd: AppCommand) -> Result<(), GlueError> {
        let written = retry_interrupted(|| (&self.pipe).write(&[cmd.as_byte()]))?;
        if written != 1 {
            return Err(GlueError::ShortWrite { written });
        }
        self.counters.written.fetch_add(1, Ordering::AcqRel);
        trace!("Wrote command {:?} to fd {}", cmd, self.pipe.as_raw_fd());
        Ok(())
    }

    /// Writes one command, aborting the process if the write fails.
    pub fn write_command(&self, cmd: AppCommand) {
        if let Err(e) = self.try_write_command(cmd) {
            fatal(e);
        }
    }

    pub fn counters(&self) -> Arc<ChannelCounters> {
        self.counters.clone()
    }
}

/// Application-thread end of the channel.
#[derive(Debug)]
pub struct CommandReceiver {
    pipe: File,
    counters: Arc<ChannelCounters>,
}

impl CommandReceiver {
    /// Blocks until one command byte is available and decodes it.
    pub fn try_read_command(&mut self) -> Result<AppCommand, GlueError> {
        let mut byte = [0u8; 1];
        let n = retry_interrupted(|| self.pipe.read(&mut byte))?;
        if n == 0 {
            return Err(GlueError::ChannelClosed);
        }
        let cmd = AppCommand::try_from(byte[0])?;
        self.counters.read.fetch_add(1, Ordering::AcqRel);
        trace!("Read command {:?}", cmd);
        Ok(cmd)
    }

    /// Blocks for one command, aborting the process on a framing error.
    pub fn read_command(&mut self) -> AppCommand {
        match self.try_read_command() {
            Ok(cmd) => cmd,
            Err(e) => fatal(e),
        }
    }

    pub fn counters(&self) -> Arc<ChannelCounters> {
        self.counters.clone()
    }
}

impl AsRawFd for CommandReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.pipe.as_raw_fd()
    }
}
