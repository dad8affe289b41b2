//! Deadline-bounded reads
//!
//! Every external read of a request carries a deadline. Optional reads
//! degrade to "nothing" on failure; required ones surface a store error.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use vouch_store::StoreError;

/// Await `fut` for at most `deadline`; failures and timeouts become `None`
pub async fn degrade<T, F>(what: &str, deadline: Duration, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Fetching {} failed, continuing without it: {}", what, e);
            None
        }
        Err(_) => {
            warn!("Fetching {} timed out after {:?}, continuing without it", what, deadline);
            None
        }
    }
}

/// Await `fut` for at most `deadline`; a timeout is a store error
pub async fn require<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degrade() {
        let deadline = Duration::from_millis(20);
        assert_eq!(degrade("ok", deadline, async { Ok(3) }).await, Some(3));

        let failed: Option<u32> = degrade("broken", deadline, async {
            Err(StoreError::Unavailable("down".to_string()))
        })
        .await;
        assert_eq!(failed, None);

        let slow: Option<u32> = degrade("slow", deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(slow, None);
    }

    #[tokio::test]
    async fn test_require_times_out() {
        let result: Result<u32, StoreError> = require(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(10))));
    }
}
