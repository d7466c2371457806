//! Serialized access to the model runtime.
//!
//! The native engine behind a loaded model is single-consumer: at most one
//! `generate` call may run at a time. [`GenerationGate`] hands out a single
//! permit, either queueing or rejecting callers depending on the configured
//! [`ConcurrencyPolicy`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::ConcurrencyPolicy;
use crate::error::RequestError;

/// Single-slot gate in front of `Model::generate`.
#[derive(Debug, Clone)]
pub struct GenerationGate {
    permit: Arc<Semaphore>,
    policy: ConcurrencyPolicy,
    waiting: Arc<AtomicUsize>,
}

/// Proof of exclusive access to the model.
///
/// Move it into the blocking task that calls the model so the slot is held
/// until the native call really returns, even if the awaiting request has
/// already given up.
#[derive(Debug)]
pub struct GenerationPermit {
    _permit: OwnedSemaphorePermit,
}

/// Decrements the waiting gauge when the acquiring future finishes or is
/// dropped by a timeout.
struct Waiting<'a>(&'a AtomicUsize);

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GenerationGate {
    pub fn new(policy: ConcurrencyPolicy) -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
            policy,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire the generation slot according to the policy.
    pub async fn acquire(&self) -> Result<GenerationPermit, RequestError> {
        match self.policy {
            ConcurrencyPolicy::Queue => self.wait().await,
            ConcurrencyPolicy::Reject => self.try_acquire(),
        }
    }

    /// Wait for the slot. Cancel-safe: dropping the future gives up the place
    /// in line.
    pub async fn wait(&self) -> Result<GenerationPermit, RequestError> {
        let ahead = self.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = Waiting(&self.waiting);
        if self.is_busy() {
            tracing::debug!(ahead, "waiting for generation slot");
        }
        let permit = Arc::clone(&self.permit)
            .acquire_owned()
            .await
            .map_err(|_| RequestError::InternalGeneration("generation gate closed".to_string()))?;
        Ok(GenerationPermit { _permit: permit })
    }

    /// Take the slot only if it is free right now.
    pub fn try_acquire(&self) -> Result<GenerationPermit, RequestError> {
        match Arc::clone(&self.permit).try_acquire_owned() {
            Ok(permit) => Ok(GenerationPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(RequestError::Busy),
            Err(TryAcquireError::Closed) => Err(RequestError::InternalGeneration(
                "generation gate closed".to_string(),
            )),
        }
    }

    /// Whether a generation currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Number of callers currently queued in [`GenerationGate::wait`].
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
