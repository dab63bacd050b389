//! Bounded pool of remote-browser sessions
//!
//! Hands out at most `capacity` live sessions at a time. Excess acquirers
//! queue FIFO on one-shot channels and are granted the exact session a
//! finishing job releases, so no new session is launched while anyone is
//! waiting. A failed creation surrenders its claimed slot to the longest
//! waiter, which then creates its own session; queued acquirers are never
//! stranded by someone else's connection error. A release with an empty
//! queue tears the session down instead of caching it; long-lived remote
//! sessions accumulate state, and relaunching is cheaper than debugging
//! it.

use crate::{CaptureError, EngineConfig};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// Creates and disposes remote-browser sessions.
///
/// The pool is generic over this seam so its capacity, FIFO fairness and
/// rollback behavior can be exercised without a live browser.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Send + 'static;

    async fn create(&self) -> Result<Self::Session, CaptureError>;

    async fn dispose(&self, session: Self::Session);
}

/// A live Chrome DevTools session: the browser handle plus the task
/// draining its protocol event stream.
#[derive(Debug)]
pub struct CdpSession {
    pub browser: Browser,
    handler: tokio::task::JoinHandle<()>,
}

impl CdpSession {
    async fn shutdown(mut self) {
        let _ = self.browser.close().await;
        self.handler.abort();
    }
}

/// Production factory connecting to a remote DevTools endpoint
pub struct CdpSessionFactory {
    endpoint: String,
}

impl CdpSessionFactory {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            endpoint: config.automation_endpoint.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    type Session = CdpSession;

    async fn create(&self) -> Result<CdpSession, CaptureError> {
        let (browser, mut handler) = Browser::connect(self.endpoint.clone())
            .await
            .map_err(|e| CaptureError::SessionCreation(e.to_string()))?;

        // The handler implements Stream and must be polled for the
        // connection to make progress.
        let handler_task = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("CDP handler error: {}", e);
                        break;
                    }
                    None => {
                        debug!("CDP handler stream ended");
                        break;
                    }
                }
            }
        });

        debug!("Connected session to {}", self.endpoint);
        Ok(CdpSession {
            browser,
            handler: handler_task,
        })
    }

    async fn dispose(&self, session: CdpSession) {
        session.shutdown().await;
    }
}

/// `Some` hands a waiter a released session; `None` hands it a freed
/// slot to create its own session in.
type Handoff<S> = Option<S>;

struct PoolState<S> {
    live: usize,
    waiters: VecDeque<oneshot::Sender<Handoff<S>>>,
}

/// Bounded session pool with FIFO hand-off
pub struct SessionPool<F: SessionFactory> {
    factory: F,
    capacity: usize,
    state: Mutex<PoolState<F::Session>>,
}

/// Convenience alias for the production pool
pub type CdpSessionPool = SessionPool<CdpSessionFactory>;

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub live: usize,
    pub waiting: usize,
    pub capacity: usize,
}

impl<F: SessionFactory> SessionPool<F> {
    pub fn new(factory: F, capacity: usize) -> Arc<Self> {
        info!("Session pool created with capacity {}", capacity);
        Arc::new(Self {
            factory,
            capacity,
            state: Mutex::new(PoolState {
                live: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    /// Acquire a session, suspending while the pool is at capacity.
    ///
    /// Queued acquirers are granted sessions in call order. If session
    /// creation fails the claimed slot is surrendered to the longest
    /// waiter (or the live count rolled back when nobody waits) and the
    /// error propagates to the caller.
    pub async fn acquire(&self) -> Result<F::Session, CaptureError> {
        let receiver = {
            let mut state = self.state.lock().await;
            if state.live < self.capacity {
                state.live += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        match receiver {
            None => self.create_for_slot().await,
            Some(rx) => match rx.await.map_err(|_| CaptureError::PoolClosed)? {
                Some(session) => Ok(session),
                // A slot freed without a session to hand over; this
                // acquirer inherits the slot and creates its own.
                None => self.create_for_slot().await,
            },
        }
    }

    /// Create a session for an already-claimed slot, surrendering the
    /// slot on failure.
    async fn create_for_slot(&self) -> Result<F::Session, CaptureError> {
        match self.factory.create().await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!("Session creation failed: {}", e);
                self.surrender_slot().await;
                Err(e)
            }
        }
    }

    /// Give a claimed slot back without a session: wake the longest
    /// waiter to claim it, or decrement the live count when the queue is
    /// empty.
    async fn surrender_slot(&self) {
        loop {
            let waiter = {
                let mut state = self.state.lock().await;
                match state.waiters.pop_front() {
                    Some(tx) => tx,
                    None => {
                        state.live -= 1;
                        return;
                    }
                }
            };

            if waiter.send(None).is_ok() {
                return;
            }
            // The waiter gave up; try the next one.
        }
    }

    /// Return a session to the pool.
    ///
    /// The session is handed to the longest-waiting queued acquirer if any,
    /// otherwise it is disposed and the live count decremented.
    pub async fn release(&self, session: F::Session) {
        let mut session = session;
        loop {
            let waiter = {
                let mut state = self.state.lock().await;
                match state.waiters.pop_front() {
                    Some(tx) => Some(tx),
                    None => {
                        state.live -= 1;
                        None
                    }
                }
            };

            match waiter {
                Some(tx) => match tx.send(Some(session)) {
                    Ok(()) => return,
                    // The waiter gave up; try the next one.
                    Err(rejected) => {
                        let Some(returned) = rejected else { return };
                        session = returned;
                    }
                },
                None => {
                    self.factory.dispose(session).await;
                    return;
                }
            }
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            live: state.live,
            waiting: state.waiters.len(),
            capacity: self.capacity,
        }
    }
}
