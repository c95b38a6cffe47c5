//! Session storage: a guarded map of live PTY sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{info, warn};

use super::{SessionContext, SessionId, SessionPhase};
use crate::error::ShellRelayError;
use crate::expect::Expector;
use crate::pty::ProcessHandle;
use crate::Result;

/// What flavor of session a process handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// Runs exactly one command to completion or a pause point.
    OneShot,
    /// Long-lived interactive shell surviving many executions.
    PersistentShell,
    /// The singleton shell rooted at the shared programs directory.
    SharedDirectoryShell,
}

/// A live session: one exclusively-owned process handle plus the
/// expectation state for its output stream.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Session flavor.
    pub kind: SessionKind,
    /// The PTY-attached child. Owned by exactly this session.
    pub handle: ProcessHandle,
    /// Incremental expectation state for the output stream.
    pub expector: Expector,
    /// Execution context (cwd, last command).
    pub context: SessionContext,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Whether a supplied credential has already been sent.
    pub password_sent: bool,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
    /// Wall-clock time of last activity.
    pub last_activity: SystemTime,
}

impl Session {
    /// Create a new session wrapping a freshly spawned handle.
    pub fn new(kind: SessionKind, handle: ProcessHandle) -> Self {
        let now = SystemTime::now();
        Self {
            id: SessionId::new(),
            kind,
            handle,
            expector: Expector::new(),
            context: SessionContext::new(),
            phase: SessionPhase::Created,
            password_sent: false,
            created_at: now,
            last_activity: now,
        }
    }

    /// Update the last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = SystemTime::now();
    }

    /// Duration since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed().unwrap_or(Duration::ZERO)
    }

    /// Summary of this session for listing.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.to_string(),
            kind: self.kind,
            cwd: self
                .context
                .cwd()
                .map(|p| p.to_string_lossy().into_owned()),
            created_at: unix_secs(self.created_at),
            last_activity: unix_secs(self.last_activity),
        }
    }
}

/// Brief session description for listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session ID string (`sess-XXXXXXXX`).
    pub session_id: String,
    /// Session flavor.
    pub kind: SessionKind,
    /// Best-effort working directory.
    pub cwd: Option<String>,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Last activity time, seconds since the Unix epoch.
    pub last_activity: u64,
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Thread-safe storage for sessions.
///
/// The outer map lock is held only for lookup, insert, and remove. Each
/// session sits behind its own mutex, and [`SessionRegistry::with_session`]
/// holds that mutex for the whole closure, so two concurrent executes
/// against one session are fully serialized and can never interleave reads
/// of the same process stream.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

/// Map entry: the session plus its child pid, captured at insert so a
/// close can reach the process without taking the session lock.
struct SessionEntry {
    session: Arc<Mutex<Session>>,
    pid: u32,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a session, returning its ID.
    pub fn insert(&self, session: Session) -> Result<SessionId> {
        let id = session.id;
        let pid = session.handle.pid();
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ShellRelayError::LockPoisoned)?;
        sessions.insert(
            id,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                pid,
            },
        );
        info!(session = %id, "session registered");
        Ok(id)
    }

    fn entry(&self, id: &SessionId) -> Result<Arc<Mutex<Session>>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| ShellRelayError::LockPoisoned)?;
        sessions
            .get(id)
            .map(|e| Arc::clone(&e.session))
            .ok_or_else(|| ShellRelayError::SessionNotFound(id.to_string()))
    }

    /// Run `f` with exclusive access to the session.
    ///
    /// The per-session lock is held for the entire call, covering the full
    /// lookup+execute sequence. The map lock is released before `f` runs,
    /// so other sessions proceed unhindered.
    pub fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().map_err(|_| ShellRelayError::LockPoisoned)?;
        session.touch();
        Ok(f(&mut session))
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }

    /// Remove a session from the map without touching its process.
    ///
    /// Used after an EOF path where the child already exited.
    pub fn remove(&self, id: &SessionId) -> Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ShellRelayError::LockPoisoned)?;
        Ok(sessions.remove(id).is_some())
    }

    /// Close a session: force-terminate its process within a bounded grace
    /// period and drop it from the map.
    ///
    /// A session with an execute in flight holds its own lock, possibly
    /// for the whole command timeout. Close does not wait that out: it
    /// kills the child out-of-band by pid, which makes the in-flight wait
    /// see EOF and release the lock promptly.
    ///
    /// Idempotent: closing an unknown or already-closed session returns
    /// `Ok(false)` rather than an error.
    pub fn close(&self, id: &SessionId) -> Result<bool> {
        let entry = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| ShellRelayError::LockPoisoned)?;
            sessions.remove(id)
        };

        let Some(entry) = entry else {
            return Ok(false);
        };

        // Terminate even if a panicking holder poisoned the lock; leaking
        // the child would orphan a live shell.
        let mut session = match entry.session.try_lock() {
            Ok(session) => session,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => {
                kill_by_pid(entry.pid);
                entry
                    .session
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
            }
        };
        let _ = session.phase.transition_to(SessionPhase::Closed);
        session.handle.terminate(true);
        info!(session = %id, "session closed");
        Ok(true)
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Summaries of all live sessions.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let entries: Vec<Arc<Mutex<Session>>> = {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| ShellRelayError::LockPoisoned)?;
            sessions.values().map(|e| Arc::clone(&e.session)).collect()
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let session = entry.lock().map_err(|_| ShellRelayError::LockPoisoned)?;
            summaries.push(session.summary());
        }
        Ok(summaries)
    }

    /// Evict sessions idle longer than `max_age`.
    ///
    /// Sessions currently executing hold their own lock and are skipped,
    /// so an active session is never reaped. Returns the eviction count.
    pub fn reap_idle(&self, max_age: Duration) -> Result<usize> {
        let entries: Vec<(SessionId, Arc<Mutex<Session>>)> = {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| ShellRelayError::LockPoisoned)?;
            sessions
                .iter()
                .map(|(id, e)| (*id, Arc::clone(&e.session)))
                .collect()
        };

        let mut reaped = 0;
        for (id, entry) in entries {
            let idle = match entry.try_lock() {
                Ok(session) => session.idle_duration(),
                Err(_) => continue,
            };
            if idle > max_age {
                warn!(session = %id, idle_secs = idle.as_secs(), "reaping idle session");
                if self.close(&id)? {
                    reaped += 1;
                }
            }
        }
        Ok(reaped)
    }

    /// Force-terminate every session. Intended for process shutdown so no
    /// live shells are orphaned. Returns the number of sessions closed.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<SessionId> = self
            .sessions
            .lock()
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default();

        let mut closed = 0;
        for id in ids {
            if matches!(self.close(&id), Ok(true)) {
                closed += 1;
            }
        }
        if closed > 0 {
            warn!(count = closed, "terminated all sessions at shutdown");
        }
        closed
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Kill a child without going through its (possibly locked) session.
///
/// The child is the pty session leader, so its process group is taken
/// down too; foreground children otherwise keep the slave side open and
/// the in-flight read would never see EOF.
#[cfg(unix)]
fn kill_by_pid(pid: u32) {
    if pid == 0 {
        return;
    }
    warn!(pid, "killing busy session out-of-band");
    let pid = pid as i32;
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
        libc::kill(pid, libc::SIGKILL);
    }
}

/// No out-of-band kill path off Unix; close waits for the session lock.
#[cfg(not(unix))]
fn kill_by_pid(_pid: u32) {}
