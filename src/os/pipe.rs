// src/os/pipe.rs

//! Anonymous pipes used for cross-thread readiness signaling.
//!
//! Both ends are handed out as `File`s so callers can use `Read`/`Write`
//! directly. The read end is what gets registered with the looper.

use anyhow::{Context, Result};
use log::trace;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Read and write ends of one pipe.
#[derive(Debug)]
pub struct Pipe {
    pub reader: File,
    pub writer: File,
}

impl Pipe {
    pub fn new() -> Result<Self> {
        let (read_fd, write_fd) = nix::unistd::pipe().context("Failed to create pipe")?;
        let pipe = Pipe {
            reader: File::from(read_fd),
            writer: File::from(write_fd),
        };
        trace!(
            "Created pipe (read fd {}, write fd {})",
            pipe.reader.as_raw_fd(),
            pipe.writer.as_raw_fd()
        );
        Ok(pipe)
    }
}

/// Puts `fd` into non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("Failed to read flags of fd {}", fd));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("Failed to set O_NONBLOCK on fd {}", fd));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn bytes_written_arrive_at_the_reader() {
        let mut pipe = Pipe::new().unwrap();
        pipe.writer.write_all(&[7, 9]).unwrap();
        let mut buf = [0u8; 2];
        pipe.reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [7, 9]);
    }

    #[test]
    fn nonblocking_reader_reports_would_block_when_empty() {
        let mut pipe = Pipe::new().unwrap();
        set_nonblocking(pipe.reader.as_raw_fd()).unwrap();
        let mut buf = [0u8; 1];
        let err = pipe.reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
