//! Debug session core for a GDB Remote Serial Protocol stub.
//!
//! This crate is the translation layer between a decoded RSP command stream
//! (GDB or LLDB on the other end of the wire) and a target process under
//! debug. It owns the inferior for the lifetime of the session, resolves
//! `(pid, tid)` selectors to thread handles, drives the vCont resume engine,
//! serves paginated qXfer object reads, and keeps the session-local books:
//! debugger-requested allocations and saved register snapshots.
//!
//! Packet framing, transport, process spawning primitives and CPU state
//! layouts are not part of this crate. They are reached through the traits in
//! [`target`] and [`protocol::SessionChannel`], so the core can be driven by
//! a real ptrace-based platform as well as by a scripted target in tests.

pub mod error;
pub mod protocol;
pub mod session;
pub mod target;

pub use error::Error;
pub use session::DebugSession;

/// Transforms `Result` into `Option` and logs an error if it occurs.
///
/// Used on paths where a single broken thread or a leaked resource must not
/// abort the surrounding operation.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "session", "{e}");
                None
            }
        }
    };
    ($res: expr, $($arg: tt)+) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "session", "{}: {e}", format!($($arg)+));
                None
            }
        }
    };
}
