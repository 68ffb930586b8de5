use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A background service that runs until asked to stop or until it has nothing left to do.
pub trait Daemon: Send {
    fn shutdown_handle(&self) -> ShutdownHandle;

    /// Spawns the service onto the current runtime.
    fn start(self);
}

/// Held by the service itself: observes shutdown requests and reports when the service has ended.
#[derive(Debug, Default, Clone)]
pub struct FinishHandle {
    stop: CancellationToken,
    done: CancellationToken,
}

/// Held by whoever owns the service: requests a stop and waits for the service to end.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: CancellationToken,
    done: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
#[error("service did not finish within {0:?} of the shutdown request")]
pub struct ShutdownTimeout(pub Duration);

impl FinishHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: self.stop.clone(),
            done: self.done.clone(),
        }
    }

    /// Marks the service as ended. Must be called on every exit path.
    pub fn finish(&self) {
        self.done.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub async fn shutdown_requested(&self) {
        self.stop.cancelled().await
    }

    /// Token for channel workers, checked between blocks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

impl ShutdownHandle {
    /// Requests a stop without waiting for it. See [`ShutdownHandle::finished`].
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Resolves once the service has ended, whether it was asked to or stopped on its own.
    pub async fn finished(&self) {
        self.done.cancelled().await
    }

    /// Requests a stop and waits up to `timeout` for the service to end.
    pub async fn shutdown_and_wait(&self, timeout: Duration) -> Result<(), ShutdownTimeout> {
        self.shutdown();
        tokio::time::timeout(timeout, self.finished())
            .await
            .map_err(|_| ShutdownTimeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_reaches_finish_handle() {
        let finish_handle = FinishHandle::new();
        let shutdown_handle = finish_handle.shutdown_handle();
        let token = finish_handle.cancellation_token();

        assert!(!finish_handle.is_shutdown_requested());
        shutdown_handle.shutdown();
        assert!(finish_handle.is_shutdown_requested());
        assert!(token.is_cancelled());

        finish_handle.finish();
        shutdown_handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_wait() {
        let finish_handle = FinishHandle::new();
        let shutdown_handle = finish_handle.shutdown_handle();

        assert!(shutdown_handle
            .shutdown_and_wait(Duration::from_secs(1))
            .await
            .is_err());

        tokio::spawn({
            let finish_handle = finish_handle.clone();
            async move {
                finish_handle.shutdown_requested().await;
                finish_handle.finish();
            }
        });
        assert!(shutdown_handle
            .shutdown_and_wait(Duration::from_secs(1))
            .await
            .is_ok());
    }
}
