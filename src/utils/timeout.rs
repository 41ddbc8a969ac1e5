//! Timeout helpers for async operations.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default timeout for connect attempts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an interoperability call waits for its reply
pub const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// How long central relays a call to a world before giving up; shorter than
/// [`RPC_CALL_TIMEOUT`] so the login side still gets a reply
pub const RPC_RELAY_TIMEOUT: Duration = Duration::from_millis(1500);

/// How long a `Migrating` directory entry waits for its world to claim it
pub const MIGRATION_WINDOW: Duration = Duration::from_secs(30);

/// How long accept loops wait for live connections on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `fut`, mapping an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Await `fut` under an optional deadline.
pub async fn with_optional_timeout<F, T>(fut: F, duration: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        Some(duration) => with_timeout_error(fut, duration).await,
        None => fut.await,
    }
}
