//! Adapter process lifecycle (spec §4.1, §4.4 scenario 5).
//!
//! Unlike the debuggee, the debug adapter is never traced: this crate only
//! ever talks DAP over its stdio, so a plain `std::process::Command` with
//! piped stdio stands in for the teacher's `fork`+`ptrace` install sequence.

use std::process::{Child as StdChild, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use crate::error::{Error, Result};

/// A spawned debug adapter process, split into the handles the codec needs
/// and the handle used to reap it.
pub struct AdapterProcess {
    program: String,
    args: Vec<String>,
    child: Option<StdChild>,
}

impl AdapterProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// Launch the adapter, returning the stdin/stdout handles the wire codec
    /// reads and writes. Errors if already spawned.
    pub fn spawn(&mut self) -> Result<(ChildStdin, ChildStdout)> {
        if self.child.is_some() {
            return Err(Error::AdapterAlreadySpawned);
        }
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        self.child = Some(child);
        Ok((stdin, stdout))
    }

    /// Non-blocking check for whether the adapter has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let child = self.child.as_mut().ok_or(Error::AdapterNotSpawned)?;
        Ok(child.try_wait()?)
    }

    /// Block until the adapter exits, as `disconnect { terminateDebuggee }`
    /// or `terminate` expect the caller to do afterward (spec §4.1).
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let child = self.child.as_mut().ok_or(Error::AdapterNotSpawned)?;
        Ok(child.wait()?)
    }

    pub fn kill(&mut self) -> Result<()> {
        let child = self.child.as_mut().ok_or(Error::AdapterNotSpawned)?;
        child.kill()?;
        Ok(())
    }

    pub fn is_spawned(&self) -> bool {
        self.child.is_some()
    }
}
