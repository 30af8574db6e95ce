//! Shaping of per-thread trap information into stop replies.

use crate::error::Error;
use crate::protocol::{Ptid, StopCode, StopEvent, StopReason};
use crate::session::DebugSession;
use crate::target::TrapEvent;
use log::debug;

impl DebugSession {
    /// `qThreadStopInfo` and friends: stop reply for an arbitrary thread.
    pub fn on_query_thread_stop_info(&self, ptid: Ptid) -> Result<StopCode, Error> {
        self.resolve_thread(ptid)?;
        self.query_stop_code(ptid)
    }

    /// Build a stop reply from a thread's trap information.
    ///
    /// Exit-like traps carry no register state; everything else expedites
    /// the stop subset of the general registers, wire-numbered for the
    /// session mode.
    pub(crate) fn query_stop_code(&self, ptid: Ptid) -> Result<StopCode, Error> {
        let process = self.process()?;
        let thread = self.resolve_thread(ptid)?;

        let trap = thread.trap_info();
        debug!(target: "session", "shaping stop reply for thread {}", trap.tid);

        let mut stop = StopCode {
            ptid: Ptid::new(trap.pid, trap.tid),
            core: trap.core,
            reason: StopReason::SignalStop,
            ..StopCode::default()
        };

        let mut read_registers = true;
        match trap.event {
            TrapEvent::None => stop.reason = StopReason::None,
            TrapEvent::Exit => {
                stop.event = StopEvent::CleanExit;
                stop.status = trap.status;
                read_registers = false;
            }
            TrapEvent::Kill | TrapEvent::CoreDump => {
                stop.event = StopEvent::SignalExit;
                stop.signal = trap.signal;
                read_registers = false;
            }
            TrapEvent::Trap => {
                stop.event = StopEvent::Signal;
                stop.reason = StopReason::Breakpoint;
                stop.signal = trap.signal;
            }
            TrapEvent::Stop => {
                stop.event = StopEvent::Signal;
                stop.reason = StopReason::SignalStop;
                stop.signal = trap.signal;
            }
        }

        if read_registers {
            stop.thread_name = thread.name();
            let state = thread.read_cpu_state()?;
            stop.registers = state.stop_registers(self.mode.into());
        }

        for thread in process.threads() {
            stop.threads.insert(thread.tid());
        }

        Ok(stop)
    }
}
