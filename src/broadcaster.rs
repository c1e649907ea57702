//! The session registry and publish fan-out (§6). Publishing only increments
//! each session's readiness signal — it never waits for a session to consume
//! it, so one slow or wedged subscriber can never stall the others or the
//! main loop (§6 invariant: drop-on-slow-consumer).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config;
use crate::error::ProtocolError;

#[derive(Debug)]
pub struct SessionHandle {
    pub notify: Arc<Notify>,
    /// Approximates the source's counting semaphore: incremented on every
    /// publish, drained by the session on each wakeup. The sample slot still
    /// only ever holds the latest value, so this doesn't queue samples — it
    /// just lets a session tell "one publish happened" from "several did"
    /// while it was busy.
    pub pending: Arc<AtomicU32>,
    pub finished: Arc<AtomicBool>,
    pub join: JoinHandle<()>,
}

/// A cheaply cloneable handle to the shared session registry.
#[derive(Clone, Default)]
pub struct Broadcaster {
    sessions: Arc<Mutex<HashMap<u64, SessionHandle>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `id`. Fails once `config::MAX_SUBSCRIBERS`
    /// sessions are already registered, so a connection flood surfaces as a
    /// resource-exhaustion error instead of growing the registry unbounded.
    /// On failure, hands `handle` back so the caller can tear down the
    /// session task it already spawned.
    pub async fn register(
        &self,
        id: u64,
        handle: SessionHandle,
    ) -> Result<(), (ProtocolError, SessionHandle)> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= config::MAX_SUBSCRIBERS {
            return Err((ProtocolError::ResourceExhausted("subscriber registry full"), handle));
        }
        sessions.insert(id, handle);
        Ok(())
    }

    /// Signals every registered session without waiting on any of them.
    pub async fn publish(&self) {
        let sessions = self.sessions.lock().await;
        for handle in sessions.values() {
            handle.pending.fetch_add(1, Ordering::Relaxed);
            handle.notify.notify_one();
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Removes sessions whose task has set `finished` and joins them.
    pub async fn reap_finished(&self) {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            let finished_ids: Vec<u64> = sessions
                .iter()
                .filter(|(_, handle)| handle.finished.load(Ordering::Relaxed))
                .map(|(id, _)| *id)
                .collect();
            finished_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id))
                .collect::<Vec<_>>()
        };
        for handle in removed {
            if let Err(e) = handle.join.await {
                debug!(error = %e, "subscriber task panicked");
            }
        }
    }

    /// Shutdown path: force every session to exit and wait for all of them,
    /// regardless of whether they had already finished.
    pub async fn drain(&self) {
        let all: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in all {
            handle.finished.store(true, Ordering::Relaxed);
            handle.notify.notify_one();
            if let Err(e) = handle.join.await {
                debug!(error = %e, "subscriber task panicked during drain");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_handle() -> SessionHandle {
        SessionHandle {
            notify: Arc::new(Notify::new()),
            pending: Arc::new(AtomicU32::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            join: tokio::spawn(std::future::pending::<()>()),
        }
    }

    #[tokio::test]
    async fn register_fails_once_the_registry_is_full() {
        let broadcaster = Broadcaster::new();
        for id in 0..config::MAX_SUBSCRIBERS as u64 {
            broadcaster.register(id, idle_handle()).await.unwrap();
        }
        assert_eq!(broadcaster.session_count().await, config::MAX_SUBSCRIBERS);

        let overflow = idle_handle();
        let err = broadcaster
            .register(config::MAX_SUBSCRIBERS as u64, overflow)
            .await
            .unwrap_err();
        assert!(matches!(err.0, ProtocolError::ResourceExhausted(_)));
        err.1.join.abort();
    }

    #[tokio::test]
    async fn publish_increments_pending_for_every_session() {
        let broadcaster = Broadcaster::new();
        let handle = idle_handle();
        let pending = handle.pending.clone();
        broadcaster.register(0, handle).await.unwrap();

        broadcaster.publish().await;
        broadcaster.publish().await;
        assert_eq!(pending.load(Ordering::Relaxed), 2);
    }
}
