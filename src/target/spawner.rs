//! Launch configuration for a fresh inferior.
//!
//! The session fills a [`Spawner`] and hands it to the platform; the
//! platform is expected to wire the child's stdout/stderr into the output
//! delegates, usually through a pipe drained by [`forward_output`].

use log::warn;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Sink for raw inferior output chunks.
pub type OutputDelegate = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// What to launch and how to plumb its output.
#[derive(Clone, Default)]
pub struct Spawner {
    executable: PathBuf,
    arguments: Vec<String>,
    environment: HashMap<String, String>,
    output_delegate: Option<OutputDelegate>,
    error_delegate: Option<OutputDelegate>,
}

impl Spawner {
    pub fn new() -> Spawner {
        Spawner::default()
    }

    pub fn set_executable(&mut self, executable: impl Into<PathBuf>) {
        self.executable = executable.into();
    }

    pub fn set_arguments<A, I>(&mut self, arguments: A)
    where
        A: IntoIterator<Item = I>,
        I: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
    }

    pub fn set_environment(&mut self, environment: HashMap<String, String>) {
        self.environment = environment;
    }

    pub fn redirect_output_to_delegate(&mut self, delegate: OutputDelegate) {
        self.output_delegate = Some(delegate);
    }

    pub fn redirect_error_to_delegate(&mut self, delegate: OutputDelegate) {
        self.error_delegate = Some(delegate);
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    pub fn output_delegate(&self) -> Option<&OutputDelegate> {
        self.output_delegate.as_ref()
    }

    pub fn error_delegate(&self) -> Option<&OutputDelegate> {
        self.error_delegate.as_ref()
    }
}

/// Drain a pipe into an output delegate on a dedicated reader thread.
///
/// The thread ends when the write side of the pipe is closed, which for an
/// inferior's stdout/stderr means process exit.
pub fn forward_output(mut reader: os_pipe::PipeReader, delegate: OutputDelegate) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => delegate(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(target: "console", "inferior output pipe error: {e}");
                    break;
                }
            }
        }
    })
}
