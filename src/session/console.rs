//! Forwarding of inferior stdout/stderr as `O` packets.
//!
//! Output may only leave while a resume is in flight: the engine publishes
//! the outbound channel before resuming and retracts it after assembling the
//! stop reply. The slot mutex serializes every console send against that
//! publication window, so a console packet can never interleave with the
//! encoding of a normal reply.

use crate::protocol::{to_hex, SessionChannel};
use crate::target::spawner::OutputDelegate;
use log::{debug, error, warn};
use std::sync::{Arc, Mutex};

pub(crate) struct ConsoleForwarder {
    channel: Mutex<Option<Arc<dyn SessionChannel>>>,
    buffer: Mutex<Vec<u8>>,
}

impl ConsoleForwarder {
    pub(crate) fn new() -> Arc<ConsoleForwarder> {
        Arc::new(ConsoleForwarder {
            channel: Mutex::new(None),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// The closure handed to the spawner for both stdout and stderr.
    pub(crate) fn delegate(self: &Arc<Self>) -> OutputDelegate {
        let forwarder = Arc::clone(self);
        Arc::new(move |chunk| forwarder.push(chunk))
    }

    /// Make `channel` the destination of console packets for the duration of
    /// a resume.
    pub(crate) fn publish(&self, channel: Arc<dyn SessionChannel>) {
        let mut slot = self.channel.lock().unwrap();
        if slot.is_some() {
            error!(target: "console", "resume channel already published");
            debug_assert!(slot.is_none(), "resume already in flight");
        }
        *slot = Some(channel);
    }

    /// Retract the channel; buffered output past this point is a contract
    /// violation of the caller.
    pub(crate) fn retract(&self) {
        *self.channel.lock().unwrap() = None;
    }

    fn push(&self, chunk: &[u8]) {
        let mut buffer = self.buffer.lock().unwrap();
        for &byte in chunk {
            buffer.push(byte);
            if byte == b'\n' {
                self.flush_line(&mut buffer);
            }
        }
    }

    fn flush_line(&self, buffer: &mut Vec<u8>) {
        let channel = self.channel.lock().unwrap();
        match channel.as_deref() {
            Some(channel) => {
                debug!(target: "console", "forwarding {} bytes of inferior output", buffer.len());
                let mut packet = Vec::with_capacity(1 + buffer.len() * 2);
                packet.push(b'O');
                packet.extend_from_slice(to_hex(buffer).as_bytes());
                if let Err(e) = channel.send(&packet) {
                    warn!(target: "console", "console packet dropped: {e}");
                }
            }
            None => {
                error!(
                    target: "console",
                    "inferior output with no resume in flight, dropping {} bytes",
                    buffer.len()
                );
            }
        }
        buffer.clear();
    }
}
