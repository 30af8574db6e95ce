//! Wire-level value types exchanged between the framing layer and the
//! session core: ptids, qSupported features, vCont actions and stop replies.

pub mod registers;

use crate::error::Error;
use nix::sys::signal::Signal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// `lastTid` value that restarts a thread-list enumeration.
pub const ALL_THREAD_ID: i64 = -1;
/// `lastTid` value that advances a thread-list enumeration by one.
pub const ANY_THREAD_ID: i64 = 0;

/// A protocol thread selector.
///
/// Either component may be `0` (current/implicit), negative (wildcard) or
/// positive (explicit).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ptid {
    pub pid: i32,
    pub tid: i64,
}

impl Ptid {
    /// Selector matching every thread of every process.
    pub const ANY: Ptid = Ptid { pid: -1, tid: -1 };

    pub fn new(pid: i32, tid: i64) -> Ptid {
        Ptid { pid, tid }
    }

    /// Selector for the current thread of `pid`.
    pub fn process(pid: i32) -> Ptid {
        Ptid { pid, tid: 0 }
    }

    /// True for the wildcard selector, as carried by a thread-less vCont
    /// action.
    pub fn any(&self) -> bool {
        self.pid < 0 && self.tid < 0
    }
}

impl fmt::Display for Ptid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{:x}.{:x}", self.pid, self.tid)
    }
}

/// Dialect spoken by the debugger on the other end of the wire.
///
/// GDB and LLDB interpret several packet families differently, most
/// prominently the register numbering. The framing layer decides the mode
/// once per connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    Gdb,
    Lldb,
}

/// How `vAttach` wants the inferior acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachMode {
    Now,
    WaitForLaunch,
}

/// Support marker of one qSupported entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureSupport {
    Supported,
    Unsupported,
    Maybe,
    Value(String),
}

/// One qSupported entry, local or remote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub support: FeatureSupport,
}

impl Feature {
    pub fn supported(name: impl Into<String>) -> Feature {
        Feature {
            name: name.into(),
            support: FeatureSupport::Supported,
        }
    }

    pub fn unsupported(name: impl Into<String>) -> Feature {
        Feature {
            name: name.into(),
            support: FeatureSupport::Unsupported,
        }
    }

    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Feature {
        Feature {
            name: name.into(),
            support: FeatureSupport::Value(value.into()),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.support {
            FeatureSupport::Supported => write!(f, "{}+", self.name),
            FeatureSupport::Unsupported => write!(f, "{}-", self.name),
            FeatureSupport::Maybe => write!(f, "{}?", self.name),
            FeatureSupport::Value(value) => write!(f, "{}={value}", self.name),
        }
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Some((name, value)) = s.split_once('=') {
            if name.is_empty() {
                return Err(Error::InvalidArgument);
            }
            return Ok(Feature::value(name, value));
        }

        let feature = if let Some(name) = s.strip_suffix('+') {
            Feature::supported(name)
        } else if let Some(name) = s.strip_suffix('-') {
            Feature::unsupported(name)
        } else if let Some(name) = s.strip_suffix('?') {
            Feature {
                name: name.to_string(),
                support: FeatureSupport::Maybe,
            }
        } else {
            return Err(Error::InvalidArgument);
        };
        if feature.name.is_empty() {
            return Err(Error::InvalidArgument);
        }
        Ok(feature)
    }
}

/// One vCont resume action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeAction {
    Continue,
    ContinueWithSignal,
    Step,
    StepWithSignal,
    /// Non-stop `t` action; negatively advertised, never executed.
    Stop,
}

/// A resume action bound to a thread selector.
///
/// A wildcard [`Ptid`] makes the action global: it applies to every thread
/// that no specific action claimed.
#[derive(Clone, Debug)]
pub struct ThreadResumeEntry {
    pub ptid: Ptid,
    pub action: ResumeAction,
    pub signal: Option<Signal>,
    pub address: Option<u64>,
}

/// Why the inferior is no longer running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    #[default]
    None,
    SignalStop,
    Breakpoint,
}

/// What happened to the inferior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopEvent {
    #[default]
    Signal,
    SignalExit,
    CleanExit,
}

/// A fully shaped stop reply, ready for the framing layer to serialize.
#[derive(Debug, Default)]
pub struct StopCode {
    pub ptid: Ptid,
    pub core: u32,
    pub reason: StopReason,
    pub event: StopEvent,
    pub signal: i32,
    pub status: i32,
    pub thread_name: Option<String>,
    /// Expedited general registers, wire-numbered for the session mode.
    pub registers: BTreeMap<u32, Vec<u8>>,
    /// Every thread alive at stop time.
    pub threads: BTreeSet<i64>,
}

/// Kind carried by a `Z`/`z` breakpoint packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakpointType {
    Software,
    Hardware,
    WriteWatchpoint,
    ReadWatchpoint,
    AccessWatchpoint,
}

/// Outbound half of the framing-layer session.
///
/// The core needs exactly one thing from it: pushing a raw, already shaped
/// packet body onto the wire. Console output is the only packet the core
/// sends on its own.
pub trait SessionChannel: Send + Sync {
    fn send(&self, packet: &[u8]) -> Result<(), Error>;
}

/// Encode bytes as lowercase pairwise hex, the RSP binary-payload form.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
