//! A fully scripted target: process, threads, CPU states, platform and
//! outbound channel, all recording what the session asks of them.

#![allow(dead_code)]

use nix::sys::signal::Signal;
use rsp_session::error::Error;
use rsp_session::protocol::{SessionChannel, SessionMode};
use rsp_session::target::registers::{
    LldbDescriptor, RegisterDef, RegisterNumbering, RegisterSet,
};
use rsp_session::target::spawner::Spawner;
use rsp_session::target::{
    BreakpointKind, BreakpointManager, CpuState, Endianness, MemoryProtection, Platform, Process,
    ProcessInfo, SharedLibrary, TargetDescription, Thread, ThreadState, TrapEvent, TrapInfo,
};
use rsp_session::DebugSession;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// LLDB wire numbers start here; GDB numbers start at zero. Keeping the two
/// apart makes mode mix-ups visible in tests.
pub const LLDB_REGNO_BASE: u32 = 100;

// --------------------------------- CPU state -------------------------------------------------

/// Four 64-bit little-endian registers in a flat byte buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedCpuState {
    pub bytes: Vec<u8>,
}

impl ScriptedCpuState {
    pub const REGISTERS: usize = 4;

    pub fn seeded(seed: u64) -> ScriptedCpuState {
        let mut bytes = Vec::with_capacity(Self::REGISTERS * 8);
        for i in 0..Self::REGISTERS as u64 {
            bytes.extend_from_slice(&(seed + i).to_le_bytes());
        }
        ScriptedCpuState { bytes }
    }

    fn index(numbering: RegisterNumbering, regno: u32) -> Option<usize> {
        let index = match numbering {
            RegisterNumbering::Gdb => regno as usize,
            RegisterNumbering::Lldb => regno.checked_sub(LLDB_REGNO_BASE)? as usize,
        };
        (index < Self::REGISTERS).then_some(index)
    }
}

impl CpuState for ScriptedCpuState {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn gp_values(&self) -> Vec<u64> {
        self.bytes
            .chunks(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    fn set_gp_values(&mut self, values: &[u64]) {
        for (slot, value) in self.bytes.chunks_mut(8).zip(values) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn stop_registers(&self, numbering: RegisterNumbering) -> BTreeMap<u32, Vec<u8>> {
        let base = match numbering {
            RegisterNumbering::Gdb => 0,
            RegisterNumbering::Lldb => LLDB_REGNO_BASE,
        };
        // the stop subset is the first two registers
        (0..2usize)
            .map(|i| (base + i as u32, self.bytes[i * 8..][..8].to_vec()))
            .collect()
    }

    fn register(&self, numbering: RegisterNumbering, regno: u32) -> Option<&[u8]> {
        Self::index(numbering, regno).map(|i| &self.bytes[i * 8..i * 8 + 8])
    }

    fn register_mut(&mut self, numbering: RegisterNumbering, regno: u32) -> Option<&mut [u8]> {
        Self::index(numbering, regno).map(|i| &mut self.bytes[i * 8..i * 8 + 8])
    }
}

// --------------------------------- thread ----------------------------------------------------

pub struct ScriptedThread {
    pub pid: i32,
    pub tid: i64,
    pub core: u32,
    pub thread_name: Option<String>,
    pub state: Mutex<ThreadState>,
    pub trap: Mutex<TrapInfo>,
    pub cpu: Mutex<ScriptedCpuState>,
    pub resume_calls: Mutex<Vec<(Option<Signal>, Option<u64>)>>,
    pub step_calls: Mutex<Vec<(Option<Signal>, Option<u64>)>>,
    pub fail_resume: AtomicBool,
}

impl ScriptedThread {
    pub fn new(pid: i32, tid: i64, core: u32) -> Arc<ScriptedThread> {
        Arc::new(ScriptedThread {
            pid,
            tid,
            core,
            thread_name: Some(format!("worker-{tid}")),
            state: Mutex::new(ThreadState::Stopped),
            trap: Mutex::new(TrapInfo {
                pid,
                tid,
                core,
                event: TrapEvent::Trap,
                signal: 5,
                status: 0,
            }),
            cpu: Mutex::new(ScriptedCpuState::seeded(tid as u64 * 0x1000)),
            resume_calls: Mutex::new(Vec::new()),
            step_calls: Mutex::new(Vec::new()),
            fail_resume: AtomicBool::new(false),
        })
    }

    pub fn set_trap(&self, trap: TrapInfo) {
        *self.trap.lock().unwrap() = trap;
    }

    pub fn cpu_snapshot(&self) -> ScriptedCpuState {
        self.cpu.lock().unwrap().clone()
    }
}

impl Thread for ScriptedThread {
    fn pid(&self) -> i32 {
        self.pid
    }

    fn tid(&self) -> i64 {
        self.tid
    }

    fn core(&self) -> u32 {
        self.core
    }

    fn name(&self) -> Option<String> {
        self.thread_name.clone()
    }

    fn state(&self) -> ThreadState {
        *self.state.lock().unwrap()
    }

    fn trap_info(&self) -> TrapInfo {
        *self.trap.lock().unwrap()
    }

    fn read_cpu_state(&self) -> Result<Box<dyn CpuState>, Error> {
        Ok(Box::new(self.cpu.lock().unwrap().clone()))
    }

    fn write_cpu_state(&self, state: &dyn CpuState) -> Result<(), Error> {
        let state = state
            .as_any()
            .downcast_ref::<ScriptedCpuState>()
            .ok_or(Error::InvalidArgument)?;
        *self.cpu.lock().unwrap() = state.clone();
        Ok(())
    }

    fn resume(&self, signal: Option<Signal>, address: Option<u64>) -> Result<(), Error> {
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(Error::Unknown);
        }
        self.resume_calls.lock().unwrap().push((signal, address));
        *self.state.lock().unwrap() = ThreadState::Running;
        Ok(())
    }

    fn step(&self, signal: Option<Signal>, address: Option<u64>) -> Result<(), Error> {
        self.step_calls.lock().unwrap().push((signal, address));
        Ok(())
    }
}

// --------------------------------- breakpoint manager ----------------------------------------

#[derive(Default)]
pub struct ScriptedBreakpointManager {
    pub added: Mutex<Vec<(u64, BreakpointKind, u32)>>,
    pub removed: Mutex<Vec<u64>>,
    pub cleared: AtomicBool,
}

impl BreakpointManager for ScriptedBreakpointManager {
    fn add(&self, address: u64, kind: BreakpointKind, size: u32) -> Result<(), Error> {
        self.added.lock().unwrap().push((address, kind, size));
        Ok(())
    }

    fn remove(&self, address: u64) -> Result<(), Error> {
        self.removed.lock().unwrap().push(address);
        Ok(())
    }

    fn clear(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }
}

// --------------------------------- target description ----------------------------------------

pub struct ScriptedDescription {
    pub main: String,
    pub features: HashMap<String, String>,
}

impl Default for ScriptedDescription {
    fn default() -> ScriptedDescription {
        ScriptedDescription {
            main: concat!(
                "<?xml version=\"1.0\"?>\n",
                "<target version=\"1.0\">\n",
                "<architecture>i386:x86-64</architecture>\n",
                "<xi:include href=\"64bit-core.xml\"/>\n",
                "</target>\n"
            )
            .to_string(),
            features: HashMap::from([(
                "64bit-core.xml".to_string(),
                "<feature name=\"org.gnu.gdb.x86.core\"/>\n".to_string(),
            )]),
        }
    }
}

impl TargetDescription for ScriptedDescription {
    fn main_xml(&self) -> String {
        self.main.clone()
    }

    fn feature_xml(&self, file_name: &str) -> Option<String> {
        self.features.get(file_name).cloned()
    }
}

// --------------------------------- process ---------------------------------------------------

pub struct ScriptedProcess {
    pub pid: i32,
    pub is_attached: bool,
    pub elf: bool,
    pub info: ProcessInfo,
    pub threads: Mutex<Vec<Arc<ScriptedThread>>>,
    pub current_tid: Mutex<i64>,

    pub auxv: Vec<u8>,
    pub libraries: Vec<SharedLibrary>,
    pub library_info_address: u64,
    pub breakpoints: Option<ScriptedBreakpointManager>,
    pub description: ScriptedDescription,
    pub lldb_registers: LldbDescriptor,

    pub written_memory: Mutex<HashMap<u64, Vec<u8>>>,
    pub next_allocation: Mutex<u64>,
    pub allocations: Mutex<Vec<(u64, usize, MemoryProtection)>>,
    pub deallocations: Mutex<Vec<(u64, usize)>>,

    pub before_resume_calls: AtomicUsize,
    pub after_resume_calls: AtomicUsize,
    pub resume_calls: Mutex<Vec<(Option<Signal>, Vec<i64>)>>,
    pub stop_already_pending: AtomicBool,
    pub wait_calls: AtomicUsize,
    /// One-shot gate: `wait` blocks until the sender side fires.
    pub wait_gate: Mutex<Option<Receiver<()>>>,
    /// Signalled on entry to `wait`, so a test can synchronize with a
    /// resume that is in flight.
    pub wait_entered: Mutex<Option<Sender<()>>>,
    /// Focus change applied by the next `wait`: `(tid, trap)`.
    pub wait_focus: Mutex<Option<(i64, TrapInfo)>>,

    pub interrupt_calls: AtomicUsize,
    pub suspend_calls: AtomicUsize,
    pub terminate_calls: AtomicUsize,
    pub detach_calls: AtomicUsize,
    pub signal_pass_resets: AtomicUsize,
    pub signal_pass_updates: Mutex<Vec<(u32, bool)>>,
}

impl ScriptedProcess {
    pub fn new(pid: i32) -> ScriptedProcess {
        let mut registers = Vec::new();
        for i in 0..ScriptedCpuState::REGISTERS as u32 {
            registers.push(RegisterDef {
                name: format!("r{i}"),
                bit_size: 64,
                lldb_offset: i * 8,
                lldb_number: LLDB_REGNO_BASE + i,
                gcc_number: Some(i),
                dwarf_number: Some(i),
                ..RegisterDef::default()
            });
        }

        ScriptedProcess {
            pid,
            is_attached: false,
            elf: true,
            info: ProcessInfo {
                pid,
                parent_pid: 1,
                pointer_size: 8,
                endian: Endianness::Little,
                triple: "x86_64-unknown-linux-gnu".to_string(),
            },
            threads: Mutex::new(Vec::new()),
            current_tid: Mutex::new(0),
            auxv: (0u8..32).collect(),
            libraries: Vec::new(),
            library_info_address: 0x7f00_0000_1000,
            breakpoints: Some(ScriptedBreakpointManager::default()),
            description: ScriptedDescription::default(),
            lldb_registers: LldbDescriptor {
                sets: vec![RegisterSet {
                    name: "General Purpose Registers".to_string(),
                    registers,
                }],
            },
            written_memory: Mutex::new(HashMap::new()),
            next_allocation: Mutex::new(0x7f80_0000_0000),
            allocations: Mutex::new(Vec::new()),
            deallocations: Mutex::new(Vec::new()),
            before_resume_calls: AtomicUsize::new(0),
            after_resume_calls: AtomicUsize::new(0),
            resume_calls: Mutex::new(Vec::new()),
            stop_already_pending: AtomicBool::new(false),
            wait_calls: AtomicUsize::new(0),
            wait_gate: Mutex::new(None),
            wait_entered: Mutex::new(None),
            wait_focus: Mutex::new(None),
            interrupt_calls: AtomicUsize::new(0),
            suspend_calls: AtomicUsize::new(0),
            terminate_calls: AtomicUsize::new(0),
            detach_calls: AtomicUsize::new(0),
            signal_pass_resets: AtomicUsize::new(0),
            signal_pass_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn add_thread(&self, tid: i64, core: u32) -> Arc<ScriptedThread> {
        let thread = ScriptedThread::new(self.pid, tid, core);
        let mut threads = self.threads.lock().unwrap();
        if threads.is_empty() {
            *self.current_tid.lock().unwrap() = tid;
        }
        threads.push(Arc::clone(&thread));
        thread
    }

    pub fn find(&self, tid: i64) -> Option<Arc<ScriptedThread>> {
        self.threads
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.tid == tid)
            .cloned()
    }

    pub fn set_current(&self, tid: i64) {
        *self.current_tid.lock().unwrap() = tid;
    }
}

/// Process handle the session owns; the test keeps the [`Arc`] for
/// inspection.
pub struct SharedProcess(pub Arc<ScriptedProcess>);

impl Process for SharedProcess {
    fn info(&self) -> Result<ProcessInfo, Error> {
        Ok(self.0.info.clone())
    }

    fn pid(&self) -> i32 {
        self.0.pid
    }

    fn attached(&self) -> bool {
        self.0.is_attached
    }

    fn current_thread(&self) -> Option<Arc<dyn Thread>> {
        let tid = *self.0.current_tid.lock().unwrap();
        self.0.find(tid).map(|t| t as Arc<dyn Thread>)
    }

    fn thread(&self, tid: i64) -> Option<Arc<dyn Thread>> {
        self.0.find(tid).map(|t| t as Arc<dyn Thread>)
    }

    fn thread_ids(&self) -> Vec<i64> {
        self.0.threads.lock().unwrap().iter().map(|t| t.tid).collect()
    }

    fn threads(&self) -> Vec<Arc<dyn Thread>> {
        self.0
            .threads
            .lock()
            .unwrap()
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn Thread>)
            .collect()
    }

    fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, Error> {
        Ok((address..address + length as u64).map(|a| a as u8).collect())
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, Error> {
        self.0
            .written_memory
            .lock()
            .unwrap()
            .insert(address, data.to_vec());
        Ok(data.len())
    }

    fn allocate_memory(
        &mut self,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<u64, Error> {
        let mut next = self.0.next_allocation.lock().unwrap();
        let address = *next;
        *next += (size.max(1) as u64 + 0xfff) & !0xfff;
        self.0
            .allocations
            .lock()
            .unwrap()
            .push((address, size, protection));
        Ok(address)
    }

    fn deallocate_memory(&mut self, address: u64, size: usize) -> Result<(), Error> {
        self.0.deallocations.lock().unwrap().push((address, size));
        Ok(())
    }

    fn auxiliary_vector(&self) -> Result<Vec<u8>, Error> {
        Ok(self.0.auxv.clone())
    }

    fn shared_library_info_address(&self) -> Result<u64, Error> {
        Ok(self.0.library_info_address)
    }

    fn shared_libraries(&self) -> Result<Vec<SharedLibrary>, Error> {
        Ok(self.0.libraries.clone())
    }

    fn is_elf(&self) -> bool {
        self.0.elf
    }

    fn breakpoint_manager(&self) -> Option<&dyn BreakpointManager> {
        self.0
            .breakpoints
            .as_ref()
            .map(|manager| manager as &dyn BreakpointManager)
    }

    fn gdb_description(&self) -> &dyn TargetDescription {
        &self.0.description
    }

    fn lldb_description(&self) -> &LldbDescriptor {
        &self.0.lldb_registers
    }

    fn before_resume(&mut self) -> Result<(), Error> {
        self.0.before_resume_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn after_resume(&mut self) -> Result<(), Error> {
        self.0.after_resume_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self, signal: Option<Signal>, excluded: &HashSet<i64>) -> Result<(), Error> {
        let mut excluded: Vec<i64> = excluded.iter().copied().collect();
        excluded.sort_unstable();
        self.0.resume_calls.lock().unwrap().push((signal, excluded));
        if self.0.stop_already_pending.load(Ordering::SeqCst) {
            return Err(Error::AlreadyExist);
        }
        Ok(())
    }

    fn interrupt(&mut self) -> Result<(), Error> {
        self.0.interrupt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), Error> {
        self.0.suspend_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), Error> {
        self.0.terminate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&mut self) -> Result<(), Error> {
        self.0.detach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&mut self) -> Result<(), Error> {
        self.0.wait_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(entered) = self.0.wait_entered.lock().unwrap().as_ref() {
            let _ = entered.send(());
        }
        let gate = self.0.wait_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        if let Some((tid, trap)) = self.0.wait_focus.lock().unwrap().take() {
            self.0.set_current(tid);
            if let Some(thread) = self.0.find(tid) {
                thread.set_trap(trap);
            }
        }
        Ok(())
    }

    fn set_signal_pass(&mut self, signo: u32, pass: bool) {
        self.0.signal_pass_updates.lock().unwrap().push((signo, pass));
    }

    fn reset_signal_pass(&mut self) {
        self.0.signal_pass_resets.fetch_add(1, Ordering::SeqCst);
    }
}

// --------------------------------- platform and channel --------------------------------------

#[derive(Default)]
pub struct ScriptedPlatform {
    pub next_spawn: Mutex<Option<Arc<ScriptedProcess>>>,
    pub next_attach: Mutex<Option<Arc<ScriptedProcess>>>,
    pub captured_spawner: Mutex<Option<Spawner>>,
}

pub struct SharedPlatform(pub Arc<ScriptedPlatform>);

impl Platform for SharedPlatform {
    fn spawn(&mut self, spawner: &Spawner) -> Result<Box<dyn Process>, Error> {
        *self.0.captured_spawner.lock().unwrap() = Some(spawner.clone());
        match self.0.next_spawn.lock().unwrap().take() {
            Some(process) => Ok(Box::new(SharedProcess(process))),
            None => Err(Error::NotFound),
        }
    }

    fn attach(&mut self, pid: i32) -> Result<Box<dyn Process>, Error> {
        match self.0.next_attach.lock().unwrap().take() {
            Some(process) if process.pid == pid => Ok(Box::new(SharedProcess(process))),
            _ => Err(Error::ProcessNotFound),
        }
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingChannel {
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

impl SessionChannel for RecordingChannel {
    fn send(&self, packet: &[u8]) -> Result<(), Error> {
        self.sent.lock().unwrap().push(packet.to_vec());
        Ok(())
    }
}

// --------------------------------- session builders ------------------------------------------

/// pid 0x10 with threads 2, 3, 5 on cores 0, 1, 0.
pub fn three_thread_process() -> Arc<ScriptedProcess> {
    let process = Arc::new(ScriptedProcess::new(0x10));
    process.add_thread(2, 0);
    process.add_thread(3, 1);
    process.add_thread(5, 0);
    process
}

/// Session attached to `process`, plus the platform handle for later
/// spawns.
pub fn session_for(
    process: &Arc<ScriptedProcess>,
    mode: SessionMode,
) -> (DebugSession, Arc<ScriptedPlatform>) {
    let platform = Arc::new(ScriptedPlatform::default());
    *platform.next_attach.lock().unwrap() = Some(Arc::clone(process));
    let session = DebugSession::attach_to(
        Box::new(SharedPlatform(Arc::clone(&platform))),
        mode,
        process.pid,
    )
    .expect("scripted attach cannot fail");
    (session, platform)
}

pub fn gdb_session(process: &Arc<ScriptedProcess>) -> DebugSession {
    session_for(process, SessionMode::Gdb).0
}
