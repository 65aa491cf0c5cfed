//! Session manager (C9)
//!
//! Owns the session index backing the streamable HTTP transport: creation,
//! lookup, capacity admission, idle eviction, and shutdown (`spec.md` §4.9).
//! The index is guarded by a single lock held only for index operations;
//! transport I/O happens outside it (`spec.md` §5 "Shared resources").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::SessionError;

/// Lifecycle state of a session (`spec.md` §3 "Session").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Active,
    Closing,
    Closed,
}

/// The kind of transport a session admits, used for the capacity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Streamable,
    Sse,
}

/// A single HTTP-bound MCP session.
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub created_at: Instant,
    pub last_touched_at: RwLock<Instant>,
    pub state: RwLock<SessionState>,
    pub auth: Option<AuthContext>,
}

impl Session {
    async fn touch(&self) {
        *self.last_touched_at.write().await = Instant::now();
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    CapacityExceeded,
}

/// Capacity counters plus the session index, guarded together by one lock.
struct Index {
    sessions: HashMap<String, Arc<Session>>,
    streamable: usize,
    pending: usize,
    sse: usize,
}

/// `spec.md` §4.9: admit/onInitialize/lookup/close/gc over the session index.
pub struct SessionManager {
    index: RwLock<Index>,
    max_sessions: usize,
    session_timeout: Duration,
    total_created: AtomicU64,
}

impl SessionManager {
    pub fn new(max_sessions: usize, session_timeout: Duration) -> Self {
        Self {
            index: RwLock::new(Index {
                sessions: HashMap::new(),
                streamable: 0,
                pending: 0,
                sse: 0,
            }),
            max_sessions,
            session_timeout,
            total_created: AtomicU64::new(0),
        }
    }

    /// `hasReachedCapacity`: `streamable + pending + sse >= maxSessions`.
    async fn has_reached_capacity(&self, index: &Index) -> bool {
        index.streamable + index.pending + index.sse >= self.max_sessions
    }

    /// `admit(kind)`. At capacity, refuses without any side effect on the
    /// index (P7).
    pub async fn admit(&self, kind: SessionKind) -> Admission {
        let mut index = self.index.write().await;
        if self.has_reached_capacity(&index).await {
            return Admission::CapacityExceeded;
        }
        match kind {
            SessionKind::Streamable => index.pending += 1,
            SessionKind::Sse => index.sse += 1,
        }
        Admission::Admitted
    }

    /// `onInitialize`: mints a new session id, binds `auth`, and marks it
    /// `active`. The caller must have already called [`Self::admit`].
    pub async fn on_initialize(&self, kind: SessionKind, auth: Option<AuthContext>) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Instant::now();
        let session = Arc::new(Session {
            id: id.clone(),
            kind,
            created_at: now,
            last_touched_at: RwLock::new(now),
            state: RwLock::new(SessionState::Active),
            auth,
        });

        let mut index = self.index.write().await;
        if kind == SessionKind::Streamable {
            index.pending = index.pending.saturating_sub(1);
            index.streamable += 1;
        }
        index.sessions.insert(id, session.clone());
        self.total_created.fetch_add(1, Ordering::Relaxed);
        session
    }

    /// `lookup(id)`. Touches `lastTouchedAt` on successful lookup of an
    /// active session, per the lifecycle invariant that only active
    /// sessions accept non-initialize requests.
    pub async fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let index = self.index.read().await;
        let session = index
            .sessions
            .get(id)
            .cloned()
            .ok_or(SessionError::UnknownSession)?;
        drop(index);

        if *session.state.read().await != SessionState::Active {
            return Err(SessionError::UnknownSession);
        }
        session.touch().await;
        Ok(session)
    }

    /// `close(id, reason)`: transitions `closing` → `closed`, then removes
    /// it from the index so subsequent lookups report not-found.
    pub async fn close(&self, id: &str, reason: &str) {
        let mut index = self.index.write().await;
        if let Some(session) = index.sessions.remove(id) {
            *session.state.write().await = SessionState::Closing;
            tracing::debug!(session_id = %id, reason, "closing session");
            match session.kind {
                SessionKind::Streamable => index.streamable = index.streamable.saturating_sub(1),
                SessionKind::Sse => index.sse = index.sse.saturating_sub(1),
            }
            *session.state.write().await = SessionState::Closed;
        }
    }

    /// `gc(now)`: closes every active session idle for longer than the
    /// configured timeout. Intended to run on a 30-second timer.
    pub async fn gc(&self) {
        let stale: Vec<String> = {
            let index = self.index.read().await;
            let mut stale = Vec::new();
            for (id, session) in &index.sessions {
                if *session.state.read().await == SessionState::Active
                    && session.last_touched_at.read().await.elapsed() > self.session_timeout
                {
                    stale.push(id.clone());
                }
            }
            stale
        };

        for id in stale {
            self.close(&id, "idle").await;
        }
    }

    /// Closes every session; used during graceful shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.index.read().await.sessions.keys().cloned().collect();
        for id in ids {
            self.close(&id, "shutdown").await;
        }
    }

    pub async fn active_session_count(&self) -> usize {
        let index = self.index.read().await;
        index.streamable + index.sse
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Spawns the 30-second GC timer (`spec.md` §4.9).
    pub fn spawn_gc_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                manager.gc().await;
            }
        })
    }
}
