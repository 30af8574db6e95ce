//! The debug session: one inferior, one debugger, one conversation.

mod console;
mod registers;
mod resume;
mod stop;
mod xfer;

pub use xfer::XferChunk;

use crate::error::Error;
use crate::protocol::{
    AttachMode, BreakpointType, Feature, Ptid, SessionMode, StopCode, ALL_THREAD_ID, ANY_THREAD_ID,
};
use crate::session::console::ConsoleForwarder;
use crate::target::spawner::Spawner;
use crate::target::{
    BreakpointKind, CpuState, MemoryProtection, Platform, Process, ProcessInfo, Thread,
    ThreadState,
};
use crate::weak_error;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;

/// Protocol-side state of one debug session.
///
/// Owns the inferior for its whole lifetime and the session-local books:
/// the allocation ledger, the saved-register store and the thread-list
/// enumeration cursor. All operations are serialized by the framing layer;
/// the only concurrent actor is the console pump fed by the inferior's
/// output reader thread.
pub struct DebugSession {
    platform: Box<dyn Platform>,
    process: Option<Box<dyn Process>>,
    mode: SessionMode,
    spawner: Spawner,
    environment: HashMap<String, String>,
    console: Arc<ConsoleForwarder>,

    /// Debugger-requested allocations, address to size.
    allocations: HashMap<u64, usize>,
    /// Saved CPU-state snapshots; ids are never reused within a session.
    saved_registers: HashMap<u64, Box<dyn CpuState>>,
    next_save_id: u64,

    /// Thread-list enumeration snapshot and cursor.
    thread_ids: Vec<i64>,
    thread_index: usize,
}

impl DebugSession {
    /// Session without an inferior; the debugger is expected to attach or
    /// set program arguments before doing anything else.
    pub fn new(platform: Box<dyn Platform>, mode: SessionMode) -> DebugSession {
        DebugSession {
            platform,
            process: None,
            mode,
            spawner: Spawner::new(),
            environment: HashMap::new(),
            console: ConsoleForwarder::new(),
            allocations: HashMap::new(),
            saved_registers: HashMap::new(),
            next_save_id: 1,
            thread_ids: Vec::new(),
            thread_index: 0,
        }
    }

    /// Session around a freshly launched inferior, `args[0]` being the
    /// executable.
    pub fn launch(
        platform: Box<dyn Platform>,
        mode: SessionMode,
        args: &[String],
        environment: HashMap<String, String>,
    ) -> Result<DebugSession, Error> {
        let mut session = DebugSession::new(platform, mode);
        session.environment = environment;
        session.spawn_process(args)?;
        Ok(session)
    }

    /// Session attached to a running process.
    pub fn attach_to(
        platform: Box<dyn Platform>,
        mode: SessionMode,
        pid: i32,
    ) -> Result<DebugSession, Error> {
        let mut session = DebugSession::new(platform, mode);
        info!(target: "session", "attaching to pid {pid}");
        session.process = Some(session.platform.attach(pid)?);
        Ok(session)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    fn process(&self) -> Result<&dyn Process, Error> {
        self.process.as_deref().ok_or(Error::ProcessNotFound)
    }

    fn process_mut(&mut self) -> Result<&mut (dyn Process + '_), Error> {
        match self.process.as_mut() {
            Some(process) => Ok(&mut **process),
            None => Err(Error::ProcessNotFound),
        }
    }

    /// Resolve a ptid against the inferior.
    ///
    /// An explicit pid must match; a non-positive tid selects the current
    /// thread.
    fn find_thread(&self, ptid: Ptid) -> Option<Arc<dyn Thread>> {
        let process = self.process.as_deref()?;
        if ptid.pid > 0 && ptid.pid != process.pid() {
            return None;
        }
        if ptid.tid <= 0 {
            process.current_thread()
        } else {
            process.thread(ptid.tid)
        }
    }

    fn resolve_thread(&self, ptid: Ptid) -> Result<Arc<dyn Thread>, Error> {
        self.find_thread(ptid).ok_or(Error::ProcessNotFound)
    }

    /// Size of a general-purpose register in bits, zero when unknown.
    pub fn gpr_size(&self) -> usize {
        let Some(process) = self.process.as_deref() else {
            return 0;
        };
        match process.info() {
            Ok(info) => info.pointer_size * 8,
            Err(_) => 0,
        }
    }

    // --------------------------------- capability handshake --------------------------------------

    pub fn on_query_supported(&self, remote_features: &[Feature]) -> Vec<Feature> {
        for feature in remote_features {
            debug!(target: "session", "debugger feature: {feature}");
        }

        let process = self.process.as_deref();
        let has_breakpoint_manager = process.is_some_and(|p| p.breakpoint_manager().is_some());
        let is_elf = process.is_some_and(|p| p.is_elf());

        let mut local = vec![
            Feature::value("PacketSize", "3fff"),
            Feature::unsupported("ConditionalBreakpoints"),
        ];
        if has_breakpoint_manager {
            local.push(Feature::supported("BreakpointCommands"));
        } else {
            local.push(Feature::unsupported("BreakpointCommands"));
        }
        local.push(Feature::supported("QPassSignals"));
        local.push(Feature::supported("QProgramSignals"));
        local.push(Feature::supported("QStartNoAckMode"));
        local.push(Feature::supported("QDisableRandomization"));
        local.push(Feature::supported("QNonStop"));
        local.push(Feature::supported("multiprocess"));
        if is_elf {
            local.push(Feature::supported("qXfer:auxv:read"));
        }
        local.push(Feature::supported("qXfer:features:read"));
        if is_elf {
            local.push(Feature::supported("qXfer:libraries-svr4:read"));
        } else {
            local.push(Feature::supported("qXfer:libraries:read"));
        }
        local.push(Feature::supported("qXfer:osdata:read"));
        local.push(Feature::supported("qXfer:siginfo:read"));
        local.push(Feature::supported("qXfer:siginfo:write"));
        local.push(Feature::supported("qXfer:threads:read"));
        // tracepoints are not implemented, make sure the debugger knows
        local.push(Feature::unsupported("Qbtrace:bts"));
        local.push(Feature::unsupported("Qbtrace:off"));
        local.push(Feature::unsupported("tracenz"));
        local.push(Feature::unsupported("ConditionalTracepoints"));
        local.push(Feature::unsupported("TracepointSource"));
        local.push(Feature::unsupported("EnableDisableTracepoints"));

        local
    }

    pub fn on_non_stop_mode(&mut self, enable: bool) -> Result<(), Error> {
        if enable {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    // --------------------------------- signal programming ----------------------------------------

    /// `QPassSignals`: replace the pass set.
    pub fn on_pass_signals(&mut self, signals: &[u32]) -> Result<(), Error> {
        let process = self.process_mut()?;
        process.reset_signal_pass();
        for &signo in signals {
            debug!(target: "session", "passing signal {signo}");
            process.set_signal_pass(signo, true);
        }
        Ok(())
    }

    /// `QProgramSignals`: modify the pass set, no reset.
    pub fn on_program_signals(&mut self, signals: &[u32]) -> Result<(), Error> {
        let process = self.process_mut()?;
        for &signo in signals {
            debug!(target: "session", "programming signal {signo}");
            process.set_signal_pass(signo, false);
        }
        Ok(())
    }

    // --------------------------------- thread queries --------------------------------------------

    /// Cursor over a snapshot of live tids. [`ALL_THREAD_ID`] restarts the
    /// enumeration, [`ANY_THREAD_ID`] advances it; exhaustion reports
    /// `NotFound`.
    pub fn on_query_thread_list(&mut self, last_tid: i64) -> Result<i64, Error> {
        if self.process.is_none() {
            return Err(Error::ProcessNotFound);
        }

        match last_tid {
            ALL_THREAD_ID => {
                self.thread_index = 0;
                self.thread_ids = self.process()?.thread_ids();
            }
            ANY_THREAD_ID => self.thread_index += 1,
            _ => return Err(Error::InvalidArgument),
        }

        match self.thread_ids.get(self.thread_index) {
            Some(&tid) => Ok(tid),
            None => Err(Error::NotFound),
        }
    }

    pub fn on_query_current_thread(&self) -> Result<Ptid, Error> {
        let process = self.process()?;
        let thread = process.current_thread().ok_or(Error::ProcessNotFound)?;
        Ok(Ptid::new(process.pid(), thread.tid()))
    }

    pub fn on_thread_is_alive(&self, ptid: Ptid) -> Result<(), Error> {
        self.process()?;
        let thread = self.resolve_thread(ptid)?;
        if thread.state() == ThreadState::Terminated {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub fn on_query_attached(&self, pid: i32) -> Result<bool, Error> {
        let process = self.process()?;
        if pid > 0 && pid != process.pid() {
            return Err(Error::ProcessNotFound);
        }
        Ok(process.attached())
    }

    pub fn on_query_process_info(&self) -> Result<ProcessInfo, Error> {
        self.process()?.info()
    }

    pub fn on_query_shared_libraries_info_address(&self) -> Result<u64, Error> {
        self.process()?.shared_library_info_address()
    }

    // --------------------------------- memory ----------------------------------------------------

    pub fn on_read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, Error> {
        self.process()?.read_memory(address, length)
    }

    pub fn on_write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, Error> {
        self.process_mut()?.write_memory(address, data)
    }

    /// Allocate in the inferior and record the size for the matching
    /// deallocation.
    pub fn on_allocate_memory(
        &mut self,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<u64, Error> {
        let address = self.process_mut()?.allocate_memory(size, protection)?;
        self.allocations.insert(address, size);
        Ok(address)
    }

    pub fn on_deallocate_memory(&mut self, address: u64) -> Result<(), Error> {
        let size = *self
            .allocations
            .get(&address)
            .ok_or(Error::InvalidArgument)?;
        self.process_mut()?.deallocate_memory(address, size)?;
        self.allocations.remove(&address);
        Ok(())
    }

    // --------------------------------- breakpoints -----------------------------------------------

    pub fn on_insert_breakpoint(
        &mut self,
        kind: BreakpointType,
        address: u64,
        size: u32,
    ) -> Result<(), Error> {
        if kind != BreakpointType::Software {
            return Err(Error::Unsupported);
        }
        let manager = self
            .process()?
            .breakpoint_manager()
            .ok_or(Error::Unsupported)?;
        manager.add(address, BreakpointKind::Permanent, size)
    }

    pub fn on_remove_breakpoint(&mut self, kind: BreakpointType, address: u64) -> Result<(), Error> {
        if kind != BreakpointType::Software {
            return Err(Error::Unsupported);
        }
        let manager = self
            .process()?
            .breakpoint_manager()
            .ok_or(Error::Unsupported)?;
        manager.remove(address)
    }

    // --------------------------------- inferior lifecycle ----------------------------------------

    pub fn on_attach(&mut self, pid: i32, mode: AttachMode) -> Result<StopCode, Error> {
        if self.process.is_some() {
            return Err(Error::AlreadyExist);
        }
        if mode != AttachMode::Now {
            return Err(Error::InvalidArgument);
        }

        info!(target: "session", "attaching to pid {pid}");
        self.process = Some(self.platform.attach(pid)?);
        self.query_stop_code(Ptid::process(pid))
    }

    pub fn on_detach(&mut self, stopped: bool) -> Result<(), Error> {
        let process = self.process_mut()?;
        if let Some(manager) = process.breakpoint_manager() {
            manager.clear();
        }
        if stopped {
            process.suspend()?;
        }
        process.detach()?;
        self.process = None;
        Ok(())
    }

    pub fn on_terminate(&mut self) -> Result<StopCode, Error> {
        let process = self.process_mut()?;
        if let Err(e) = process.terminate() {
            error!(target: "session", "couldn't terminate process: {e}");
            return Err(e);
        }
        if let Err(e) = process.wait() {
            error!(target: "session", "couldn't wait for process termination: {e}");
            return Err(e);
        }
        let pid = process.pid();
        self.query_stop_code(Ptid::process(pid))
    }

    pub fn on_interrupt(&mut self) -> Result<(), Error> {
        self.process_mut()?.interrupt()
    }

    /// `A` packet: launch a fresh inferior, `args[0]` being the executable.
    pub fn on_set_program_arguments(&mut self, args: &[String]) -> Result<(), Error> {
        self.spawn_process(args)
    }

    pub fn on_query_launch_success(&self, _pid: i32) -> Result<(), Error> {
        Ok(())
    }

    fn spawn_process(&mut self, args: &[String]) -> Result<(), Error> {
        let (executable, arguments) = args.split_first().ok_or(Error::InvalidArgument)?;
        debug!(target: "session", "spawning inferior {executable:?} with arguments {arguments:?}");

        self.spawner.set_executable(executable);
        self.spawner.set_arguments(arguments.iter().cloned());
        self.spawner.set_environment(self.environment.clone());
        let delegate = self.console.delegate();
        self.spawner.redirect_output_to_delegate(delegate.clone());
        self.spawner.redirect_error_to_delegate(delegate);

        match self.platform.spawn(&self.spawner) {
            Ok(process) => {
                self.process = Some(process);
                Ok(())
            }
            Err(e) => {
                error!(target: "session", "cannot execute {executable:?}: {e}");
                Err(Error::Unknown)
            }
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        // allocations the debugger never released go away with the session
        let Some(process) = self.process.as_deref_mut() else {
            return;
        };
        for (&address, &size) in &self.allocations {
            weak_error!(
                process.deallocate_memory(address, size),
                "leaked allocation at {address:#x}"
            );
        }
    }
}
