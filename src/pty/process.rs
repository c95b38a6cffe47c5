//! Child processes attached to a PTY, built on portable-pty.
//!
//! A [`ProcessHandle`] owns the child, the PTY master, and a pump thread
//! that drains the blocking PTY reader into a channel. Every read the rest
//! of the crate performs goes through [`ProcessHandle::read_chunk`], which
//! is bounded by an explicit timeout, so no caller can hang indefinitely.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, CommandBuilder, PtySize as NativePtySize};
use tracing::{debug, warn};

use super::PtySize;
use crate::error::ShellRelayError;
use crate::Result;

/// Fixed PATH handed to every spawned child.
#[cfg(unix)]
const FIXED_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Buffer size for the pump thread's reads.
const READ_BUFFER_SIZE: usize = 4096;

/// Polling interval while waiting for process exit.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Grace period after a kill before giving up on the exit code.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Get the default shell for the current platform.
pub fn default_shell() -> &'static str {
    #[cfg(unix)]
    {
        "/bin/sh"
    }
    #[cfg(windows)]
    {
        "powershell.exe"
    }
}

/// How to spawn a child inside a PTY.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
    /// Terminal geometry.
    pub size: PtySize,
    /// Extra environment variables, applied after the controlled set.
    pub env: Vec<(String, String)>,
}

impl SpawnOptions {
    /// Run a single command line through the platform shell
    /// (`sh -c` on Unix, `cmd /c` on Windows).
    pub fn shell_command(command_line: impl Into<String>) -> Self {
        #[cfg(unix)]
        let (program, args) = ("/bin/sh".to_string(), vec!["-c".into(), command_line.into()]);
        #[cfg(windows)]
        let (program, args) = ("cmd.exe".to_string(), vec!["/c".into(), command_line.into()]);

        Self {
            program,
            args,
            working_dir: None,
            size: PtySize::default(),
            env: Vec::new(),
        }
    }

    /// Spawn an interactive shell that stays alive across commands.
    pub fn interactive_shell(shell: Option<&str>) -> Self {
        Self {
            program: shell.unwrap_or(default_shell()).to_string(),
            args: Vec::new(),
            working_dir: None,
            size: PtySize::default(),
            env: Vec::new(),
        }
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the terminal geometry.
    pub fn size(mut self, size: PtySize) -> Self {
        self.size = size;
        self
    }

    /// Add an environment variable on top of the controlled set.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// One bounded read from the PTY output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Bytes arrived.
    Data(Vec<u8>),
    /// The child closed its side; no more output will arrive.
    Eof,
    /// Nothing arrived within the timeout.
    Timeout,
}

/// A child process attached to a PTY.
///
/// The handle is exclusively owned by one session; all reads and writes go
/// through it. Dropping the handle kills the child if it is still running.
pub struct ProcessHandle {
    writer: Box<dyn Write + Send>,
    rx: Receiver<Vec<u8>>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    // Kept alive so the PTY pair is not torn down under the child.
    _master: Box<dyn portable_pty::MasterPty + Send>,
    pid: u32,
    eof_seen: bool,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    /// Spawn a child in a fresh PTY with a controlled environment.
    ///
    /// Color output is disabled (`TERM=dumb`, `NO_COLOR=1`, `FORCE_COLOR=0`)
    /// and PATH is pinned so prompt detection sees predictable bytes.
    ///
    /// Spawn failure (binary missing, permission denied) is fatal and maps
    /// to [`ShellRelayError::Spawn`].
    pub fn spawn(options: SpawnOptions) -> Result<Self> {
        let pty_system = native_pty_system();
        let native_size = NativePtySize {
            rows: options.size.rows,
            cols: options.size.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(native_size)
            .map_err(|e| ShellRelayError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.program);
        for arg in &options.args {
            cmd.arg(arg);
        }
        cmd.env("TERM", "dumb");
        cmd.env("NO_COLOR", "1");
        cmd.env("FORCE_COLOR", "0");
        #[cfg(unix)]
        cmd.env("PATH", FIXED_PATH);

        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &options.working_dir {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ShellRelayError::Spawn(e.to_string()))?;

        let pid = child.process_id().unwrap_or(0);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ShellRelayError::Pty(e.to_string()))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ShellRelayError::Pty(e.to_string()))?;

        let rx = spawn_pump(reader, pid);

        debug!(pid, program = %options.program, "spawned PTY child");

        Ok(Self {
            writer,
            rx,
            child,
            _master: pair.master,
            pid,
            eof_seen: false,
            exit_code: None,
        })
    }

    /// Process ID of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Write a line to the child's input, newline-terminated.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write raw bytes to the child's input.
    pub fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Wait up to `timeout` for the next chunk of output.
    pub fn read_chunk(&mut self, timeout: Duration) -> ReadEvent {
        if self.eof_seen {
            return ReadEvent::Eof;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(data) => ReadEvent::Data(data),
            Err(RecvTimeoutError::Timeout) => ReadEvent::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                self.eof_seen = true;
                ReadEvent::Eof
            }
        }
    }

    /// Whether the child is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait up to `timeout` for the child to exit; returns the exit code
    /// if it did.
    pub fn wait_exit(&mut self, timeout: Duration) -> Option<i32> {
        if let Some(code) = self.exit_code {
            return Some(code);
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.exit_code() as i32;
                    self.exit_code = Some(code);
                    return Some(code);
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(_) => return None,
            }
        }
    }

    /// Terminate the child.
    ///
    /// With `force` the child is killed immediately; otherwise it gets a
    /// short window to exit on its own first. Either way the call returns
    /// within a bounded grace period, with the exit code if one was
    /// observed.
    pub fn terminate(&mut self, force: bool) -> Option<i32> {
        if !force {
            if let Some(code) = self.wait_exit(Duration::from_millis(500)) {
                return Some(code);
            }
        }
        if self.is_alive() {
            warn!(pid = self.pid, "killing PTY child");
            let _ = self.child.kill();
        }
        self.wait_exit(KILL_GRACE)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit_code.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("eof_seen", &self.eof_seen)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

/// Pump the blocking PTY reader into a channel from a dedicated thread.
///
/// The thread exits on EOF, on EIO (Unix PTY behavior when the child
/// exits), or when the receiving side is dropped.
fn spawn_pump(mut reader: Box<dyn Read + Send>, pid: u32) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();

    thread::spawn(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(pid, "PTY pump: EOF");
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    #[cfg(unix)]
                    if e.raw_os_error() == Some(libc::EIO) {
                        debug!(pid, "PTY pump: EIO, treating as EOF");
                        break;
                    }
                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                    debug!(pid, error = %e, "PTY pump: read error");
                    break;
                }
            }
        }
    });

    rx
}
