//! The vCont resume engine.
//!
//! A batch carries per-thread actions plus at most one global action for
//! "everyone else". The engine resumes the named threads first, lets the
//! process continue the rest, then blocks until the next stop and shapes
//! the reply. While it blocks, the console pump owns the published channel
//! and may interleave `O` packets with the wait.

use crate::error::Error;
use crate::protocol::{Ptid, ResumeAction, SessionChannel, StopCode, ThreadResumeEntry};
use crate::session::DebugSession;
use crate::weak_error;
use log::{error, warn};
use std::collections::HashSet;
use std::sync::Arc;

impl DebugSession {
    /// Execute a resume batch and block until the inferior stops again.
    pub fn on_resume(
        &mut self,
        channel: Arc<dyn SessionChannel>,
        actions: &[ThreadResumeEntry],
    ) -> Result<StopCode, Error> {
        if self.process.is_none() {
            return Err(Error::ProcessNotFound);
        }

        // console output is allowed from here until the stop reply is ready
        self.console.publish(channel);
        let result = self.resume_and_wait(actions);
        self.console.retract();
        result
    }

    fn resume_and_wait(&mut self, actions: &[ThreadResumeEntry]) -> Result<StopCode, Error> {
        self.process_mut()?.before_resume()?;

        let mut global: Option<&ThreadResumeEntry> = None;
        let mut excluded: HashSet<i64> = HashSet::new();

        // per-thread pass; the global action fires after every named thread
        // is on its way
        for entry in actions {
            if entry.ptid.any() {
                if global.is_some() {
                    error!(target: "session", "more than one global action specified");
                    return Err(Error::AlreadyExist);
                }
                global = Some(entry);
                continue;
            }

            let Some(thread) = self.find_thread(entry.ptid) else {
                warn!(target: "session", "pid {} tid {} not found", entry.ptid.pid, entry.ptid.tid);
                continue;
            };

            let tid = thread.tid();
            match entry.action {
                ResumeAction::Continue | ResumeAction::ContinueWithSignal => {
                    let resumed = weak_error!(
                        thread.resume(entry.signal, entry.address),
                        "cannot resume tid {tid}"
                    );
                    if resumed.is_some() {
                        excluded.insert(tid);
                    }
                }
                ResumeAction::Step | ResumeAction::StepWithSignal => {
                    let stepped = weak_error!(
                        thread.step(entry.signal, entry.address),
                        "cannot step tid {tid}"
                    );
                    if stepped.is_some() {
                        excluded.insert(tid);
                    }
                }
                other => {
                    warn!(target: "session", "cannot resume tid {tid}, action {other:?} not implemented");
                }
            }
        }

        let mut stop_pending = false;
        if let Some(entry) = global {
            let process = self.process_mut()?;
            match entry.action {
                ResumeAction::Continue | ResumeAction::ContinueWithSignal => {
                    if entry.address.is_some() {
                        warn!(target: "session", "global continue with address");
                    }
                    match process.resume(entry.signal, &excluded) {
                        Ok(()) => {}
                        // a stop is already pending, do not wait for another
                        Err(Error::AlreadyExist) => stop_pending = true,
                        Err(e) => {
                            warn!(target: "session", "cannot resume pid {}: {e}", process.pid());
                        }
                    }
                }
                ResumeAction::Step | ResumeAction::StepWithSignal => {
                    if let Some(thread) = process.current_thread() {
                        if !excluded.contains(&thread.tid()) {
                            weak_error!(
                                thread.step(entry.signal, entry.address),
                                "cannot step tid {}",
                                thread.tid()
                            );
                        }
                    }
                }
                other => {
                    warn!(
                        target: "session",
                        "cannot resume pid {}, action {other:?} not implemented",
                        process.pid()
                    );
                }
            }
        }

        if !stop_pending {
            self.process_mut()?.wait()?;
        }
        self.process_mut()?.after_resume()?;

        let process = self.process()?;
        let ptid = Ptid::new(
            process.pid(),
            process
                .current_thread()
                .ok_or(Error::ProcessNotFound)?
                .tid(),
        );
        self.query_stop_code(ptid)
    }
}
