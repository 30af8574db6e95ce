//! Contracts of the platform collaborators the session core drives.
//!
//! The session never touches ptrace, task ports or debug APIs itself; a
//! platform layer implements these traits and the core stays portable (and
//! scriptable in tests). Thread handles are shared with the owning process
//! and may die between resolution and use, so every thread operation is
//! allowed to fail.

pub mod registers;
pub mod spawner;

use crate::error::Error;
use crate::target::registers::{LldbDescriptor, RegisterNumbering};
use crate::target::spawner::Spawner;
use nix::sys::signal::Signal;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

bitflags::bitflags! {
    /// Protection of a debugger-requested allocation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MemoryProtection: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Stopped,
    Terminated,
}

/// What made a thread stop, before any protocol shaping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrapEvent {
    #[default]
    None,
    Exit,
    Kill,
    CoreDump,
    Trap,
    Stop,
}

/// Raw per-thread report of the cause of the last stop.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrapInfo {
    pub pid: i32,
    pub tid: i64,
    pub core: u32,
    pub event: TrapEvent,
    pub signal: i32,
    pub status: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Static facts about the inferior.
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    pub pid: i32,
    pub parent_pid: i32,
    pub pointer_size: usize,
    pub endian: Endianness,
    pub triple: String,
}

/// One entry of the dynamic loader's link map, plus the main-module flag.
#[derive(Clone, Debug)]
pub struct SharedLibrary {
    pub main: bool,
    pub path: String,
    /// Address of the `link_map` node itself, when the loader exposed one.
    pub map_address: Option<u64>,
    /// Load bias (`l_addr`).
    pub base_address: u64,
    /// Dynamic section address (`l_ld`).
    pub ld_address: u64,
}

/// Lifetime of an inserted breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakpointKind {
    Permanent,
    TemporaryOneShot,
}

/// Software breakpoint bookkeeping owned by the process.
pub trait BreakpointManager {
    fn add(&self, address: u64, kind: BreakpointKind, size: u32) -> Result<(), Error>;
    fn remove(&self, address: u64) -> Result<(), Error>;
    fn clear(&self);
}

/// A captured CPU state of one thread.
///
/// The layout is the platform's business; the session only projects it:
/// general registers as `u64` values, the expedited stop subset, and raw
/// byte access to a single register under a given wire numbering. GDB and
/// LLDB number registers differently, which is folded into
/// [`RegisterNumbering`] instead of being re-decided at every call site.
pub trait CpuState: Send {
    fn as_any(&self) -> &dyn Any;

    fn gp_values(&self) -> Vec<u64>;
    fn set_gp_values(&mut self, values: &[u64]);

    /// Registers expedited in a stop reply, keyed by wire register number.
    fn stop_registers(&self, numbering: RegisterNumbering) -> BTreeMap<u32, Vec<u8>>;

    fn register(&self, numbering: RegisterNumbering, regno: u32) -> Option<&[u8]>;
    fn register_mut(&mut self, numbering: RegisterNumbering, regno: u32) -> Option<&mut [u8]>;
}

/// A thread of the inferior.
///
/// Handles are owned by the process; the session holds them only while an
/// operation runs.
pub trait Thread: Send + Sync {
    fn pid(&self) -> i32;
    fn tid(&self) -> i64;
    fn core(&self) -> u32;
    fn name(&self) -> Option<String>;
    fn state(&self) -> ThreadState;
    fn trap_info(&self) -> TrapInfo;

    fn read_cpu_state(&self) -> Result<Box<dyn CpuState>, Error>;
    fn write_cpu_state(&self, state: &dyn CpuState) -> Result<(), Error>;

    /// Resume the thread, optionally injecting a signal, optionally from a
    /// new program counter.
    fn resume(&self, signal: Option<Signal>, address: Option<u64>) -> Result<(), Error>;
    /// Single-step the thread with the same signal/address semantics.
    fn step(&self, signal: Option<Signal>, address: Option<u64>) -> Result<(), Error>;
}

/// GDB target-description XML source for the inferior's architecture.
pub trait TargetDescription {
    /// The `target.xml` document.
    fn main_xml(&self) -> String;
    /// A single feature document, addressed by the file name used in
    /// `target.xml` includes.
    fn feature_xml(&self, file_name: &str) -> Option<String>;
}

/// The inferior process.
pub trait Process: Send {
    fn info(&self) -> Result<ProcessInfo, Error>;
    fn pid(&self) -> i32;
    /// True when the process was acquired by attach rather than launch.
    fn attached(&self) -> bool;

    fn current_thread(&self) -> Option<Arc<dyn Thread>>;
    fn thread(&self, tid: i64) -> Option<Arc<dyn Thread>>;
    fn thread_ids(&self) -> Vec<i64>;
    fn threads(&self) -> Vec<Arc<dyn Thread>>;

    fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, Error>;
    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, Error>;
    fn allocate_memory(&mut self, size: usize, protection: MemoryProtection)
        -> Result<u64, Error>;
    fn deallocate_memory(&mut self, address: u64, size: usize) -> Result<(), Error>;

    fn auxiliary_vector(&self) -> Result<Vec<u8>, Error>;
    fn shared_library_info_address(&self) -> Result<u64, Error>;
    fn shared_libraries(&self) -> Result<Vec<SharedLibrary>, Error>;
    fn is_elf(&self) -> bool;

    fn breakpoint_manager(&self) -> Option<&dyn BreakpointManager>;

    fn gdb_description(&self) -> &dyn TargetDescription;
    fn lldb_description(&self) -> &LldbDescriptor;

    fn before_resume(&mut self) -> Result<(), Error>;
    fn after_resume(&mut self) -> Result<(), Error>;
    /// Resume every stopped thread except the excluded set, optionally
    /// injecting a signal. `AlreadyExist` means a stop is already pending
    /// and the caller must not wait.
    fn resume(&mut self, signal: Option<Signal>, excluded: &HashSet<i64>) -> Result<(), Error>;
    fn interrupt(&mut self) -> Result<(), Error>;
    fn suspend(&mut self) -> Result<(), Error>;
    fn terminate(&mut self) -> Result<(), Error>;
    fn detach(&mut self) -> Result<(), Error>;
    /// Block until the next process-level stop and refocus the current
    /// thread on its initiator.
    fn wait(&mut self) -> Result<(), Error>;

    fn set_signal_pass(&mut self, signo: u32, pass: bool);
    fn reset_signal_pass(&mut self);
}

/// Creates target processes, by launching an executable or by attaching to
/// a running pid.
pub trait Platform: Send {
    fn spawn(&mut self, spawner: &Spawner) -> Result<Box<dyn Process>, Error>;
    fn attach(&mut self, pid: i32) -> Result<Box<dyn Process>, Error>;
}
