//! Handler drivers: the byte-stream sinks firing lines are written to.
//!
//! One driver per program name, created at environment open and held for
//! the environment's lifetime. Real deployments pipe into a spawned shell
//! command; tests collect in memory.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

/// Where a firing goes: two text lines, DN then attribute, then a flush.
pub trait DriverSink: Send {
    fn send(&mut self, dn: &str, attr: &str) -> std::io::Result<()>;
}

/// A named handler slot.
pub struct LcDriver {
    pub name: String,
    pub sink: Box<dyn DriverSink>,
}

impl LcDriver {
    pub fn new(name: &str, sink: Box<dyn DriverSink>) -> Self {
        Self { name: name.to_string(), sink }
    }
}

/// A handler backed by a spawned shell command reading our pipe.
pub struct PipeSink {
    command: String,
    child: Child,
}

impl PipeSink {
    /// Spawn `sh -c <command>` with a piped stdin.
    pub fn spawn(command: &str) -> std::io::Result<Self> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .spawn()?;
        tracing::debug!("spawned handler command {command:?} (pid {})", child.id());
        Ok(Self { command: command.to_string(), child })
    }
}

impl DriverSink for PipeSink {
    fn send(&mut self, dn: &str, attr: &str) -> std::io::Result<()> {
        let stdin = self.child.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "handler stdin closed")
        })?;
        write!(stdin, "{dn}\n{attr}\n")?;
        stdin.flush()
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        // Closing stdin lets the child drain and exit; reap it so its
        // exit status does not get lost.
        drop(self.child.stdin.take());
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::error!("handler command {:?} exited with {status}", self.command);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("failed to reap handler command {:?}: {e}", self.command);
            }
        }
    }
}

/// An in-memory sink collecting `(dn, attr)` pairs, for tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl DriverSink for MemorySink {
    fn send(&mut self, dn: &str, attr: &str) -> std::io::Result<()> {
        self.lines.lock().unwrap().push((dn.to_string(), attr.to_string()));
        Ok(())
    }
}
