//! Dialog engine: per-session state machines with queued, single-flight
//! execution.
//!
//! Every session owns a queue of pending input contexts and an `active`
//! flag. Whoever enqueues into an idle session sets the flag and spawns the
//! execution loop; a busy session only gets its queue extended. The flag is
//! cleared under the same lock that observes the queue empty, so an input is
//! never stranded and two loops never run for one session.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::flow::{Context, Flow};
use crate::config::{EngineConfig, QueueOrder};
use crate::error::DialogError;

/// Opaque session identifier.
pub type SessionId = String;

type Patch<F> = <<F as Flow>::Context as Context>::Patch;

struct SessionInner<F: Flow> {
    state: F::State,
    queued: VecDeque<F::Context>,
    last_patch: Option<Patch<F>>,
    last_activity: Instant,
}

struct Session<F: Flow> {
    id: SessionId,
    inner: Mutex<SessionInner<F>>,
    /// Whether an execution loop is running. Only written with `inner` held.
    active: watch::Sender<bool>,
}

impl<F: Flow> Session<F> {
    fn lock(&self) -> MutexGuard<'_, SessionInner<F>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives sessions of a [`Flow`].
pub struct DialogEngine<F: Flow> {
    flow: Arc<F>,
    config: EngineConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Session<F>>>>,
}

impl<F: Flow> DialogEngine<F> {
    pub fn new(flow: F, config: EngineConfig) -> Self {
        Self {
            flow: Arc::new(flow),
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session, queue `context` as its first input, and start it.
    ///
    /// Returns as soon as the session exists; execution proceeds on a
    /// spawned task. Must be called within a Tokio runtime.
    pub fn create(&self, context: F::Context) -> SessionId {
        let session = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let id = loop {
                let candidate = new_session_id();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            let (active, _) = watch::channel(true);
            let session = Arc::new(Session {
                id: id.clone(),
                inner: Mutex::new(SessionInner {
                    state: self.flow.initial_state(),
                    queued: VecDeque::from([context]),
                    last_patch: None,
                    last_activity: Instant::now(),
                }),
                active,
            });
            sessions.insert(id, Arc::clone(&session));
            session
        };

        info!(session_id = %session.id, "Dialog session created");
        let id = session.id.clone();
        self.spawn_loop(session);
        id
    }

    /// Queue `context` for an existing session.
    ///
    /// Starts the execution loop if the session is idle; otherwise the
    /// running loop picks the input up.
    pub fn continue_session(&self, id: &str, context: F::Context) -> Result<(), DialogError> {
        // The map stays read-locked until the input is queued, so eviction
        // either removes the session first or sees it busy.
        let (session, start) = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            let session = sessions
                .get(id)
                .cloned()
                .ok_or_else(|| DialogError::SessionNotFound(id.to_string()))?;
            let mut inner = session.lock();
            inner.queued.push_back(context);
            inner.last_activity = Instant::now();
            let running = *session.active.borrow();
            if !running {
                session.active.send_replace(true);
            }
            debug!(session_id = %id, queued = inner.queued.len(), running, "Input queued");
            drop(inner);
            (session, !running)
        };
        if start {
            self.spawn_loop(session);
        }
        Ok(())
    }

    /// Current state of a session.
    pub fn state(&self, id: &str) -> Option<F::State> {
        self.get(id).ok().map(|s| s.lock().state)
    }

    /// Whether a session's execution loop is running.
    pub fn is_active(&self, id: &str) -> Option<bool> {
        self.get(id).ok().map(|s| *s.active.borrow())
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait until the session's queue has drained and its loop has stopped.
    pub async fn until_idle(&self, id: &str) -> Result<(), DialogError> {
        let session = self.get(id)?;
        let mut rx = session.active.subscribe();
        rx.wait_for(|active| !*active)
            .await
            .map(|_| ())
            .map_err(|_| DialogError::SessionNotFound(id.to_string()))
    }

    /// Drop idle sessions untouched for longer than `max_idle`.
    ///
    /// Sessions with a running loop or queued input are kept. Returns the
    /// number of sessions evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| {
            let inner = session.lock();
            *session.active.borrow()
                || !inner.queued.is_empty()
                || inner.last_activity.elapsed() < max_idle
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle dialog sessions");
        }
        evicted
    }

    fn get(&self, id: &str) -> Result<Arc<Session<F>>, DialogError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DialogError::SessionNotFound(id.to_string()))
    }

    fn spawn_loop(&self, session: Arc<Session<F>>) {
        let flow = Arc::clone(&self.flow);
        let config = self.config.clone();
        tokio::spawn(run_session(flow, session, config));
    }
}

/// Pop inputs until the queue drains, then clear the active flag.
async fn run_session<F: Flow>(flow: Arc<F>, session: Arc<Session<F>>, config: EngineConfig) {
    loop {
        let input = {
            let mut inner = session.lock();
            let next = match config.queue_order {
                QueueOrder::Fifo => inner.queued.pop_front(),
                QueueOrder::Lifo => inner.queued.pop_back(),
            };
            match next {
                Some(ctx) => ctx,
                None => {
                    inner.last_activity = Instant::now();
                    session.active.send_replace(false);
                    return;
                }
            }
        };
        process_input(&flow, &session, input, config.max_steps_per_input).await;
    }
}

/// Run transitions on one input until a handler suspends or fails.
async fn process_input<F: Flow>(
    flow: &Arc<F>,
    session: &Session<F>,
    input: F::Context,
    max_steps: usize,
) {
    let mut ctx = input;
    for _ in 0..max_steps {
        let (state, patch) = {
            let mut inner = session.lock();
            (inner.state, inner.last_patch.take())
        };
        if let Some(patch) = &patch {
            ctx = ctx.overlay(patch);
        }

        // Run the handler on its own task so a panic is contained.
        let handle = {
            let flow = Arc::clone(flow);
            let ctx = ctx.clone();
            tokio::spawn(async move { flow.step(state, &ctx).await })
        };
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(DialogError::HandlerPanicked {
                state: state.to_string(),
                reason: e.to_string(),
            }),
        };

        match result {
            Ok(transition) => {
                debug!(
                    session_id = %session.id,
                    from = %state,
                    to = %transition.next,
                    suspend = transition.suspend,
                    "Dialog transition"
                );
                let mut inner = session.lock();
                inner.state = transition.next;
                inner.last_patch = transition.patch;
                if transition.suspend {
                    return;
                }
            }
            Err(e) => {
                warn!(session_id = %session.id, state = %state, error = %e, "Dialog handler failed, dropping input");
                return;
            }
        }
    }

    let state = session.lock().state;
    warn!(
        session_id = %session.id,
        state = %state,
        max_steps,
        "Dialog did not suspend within the step limit, dropping input"
    );
}

/// Ten random hex digits.
fn new_session_id() -> SessionId {
    let n: u64 = rand::thread_rng().gen_range(0..(1u64 << 40));
    format!("{n:010x}")
}

/// Spawn a background task that periodically evicts idle sessions.
pub fn spawn_idle_sweeper<F: Flow>(
    engine: Arc<DialogEngine<F>>,
    max_idle: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip immediate first tick
        interval.tick().await;
        loop {
            interval.tick().await;
            engine.evict_idle(max_idle);
        }
    })
}
