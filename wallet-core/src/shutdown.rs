//! Shutdown signalling for the background sync task.

use std::sync::Arc;

use tokio::sync::Semaphore;

/// A multi-producer, multi-consumer shutdown signal. Clone to get another
/// handle; signals sent before a receiver subscribes are still observed,
/// and sending more than once is harmless.
///
/// Implemented over a zero-permit [`Semaphore`]: closing the semaphore is
/// the signal, and an [`AcquireError`] from `acquire` is its receipt.
///
/// [`AcquireError`]: tokio::sync::AcquireError
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    inner: Arc<Semaphore>,
}

impl ShutdownSignal {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(0)),
        }
    }

    /// Send the shutdown signal to all handles.
    pub fn send(&self) {
        self.inner.close();
    }

    /// Wait for a shutdown signal; returns immediately if one was already
    /// sent.
    pub async fn recv(&self) {
        if self.inner.acquire().await.is_ok() {
            unreachable!("acquired a permit from a zero-permit semaphore");
        }
    }

    /// Poll whether a shutdown signal has been sent.
    pub fn try_recv(&self) -> bool {
        self.inner.is_closed()
    }
}
