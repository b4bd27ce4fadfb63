use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{HierarchyError, Result};

/// Per-call timeout plus a shared cancellation token
#[derive(Clone, Debug, Default)]
pub struct CallGuard {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout: Some(timeout), cancel }
    }

    /// No timeout, cancelled only through [`CallGuard::token`]
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn call<T, F>(&self, what: impl FnOnce() -> String, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timed = async {
            match self.timeout {
                Some(after) => match tokio::time::timeout(after, fut).await {
                    Ok(r) => r,
                    Err(_) => Err(HierarchyError::Timeout { what: what(), after }),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HierarchyError::Cancelled),
            r = timed => r,
        }
    }
}
