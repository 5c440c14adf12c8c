//! Timeout enforcement for provider calls.
//!
//! Whatever the provider implementation does internally, the core never
//! waits past its own deadline. An elapsed deadline becomes
//! [`ProviderError::Timeout`], which is transient.

use std::future::Future;
use std::time::Duration;

use crate::chain::{ProviderError, ProviderResult};

/// Run `fut` with a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(deadline.as_millis() as u64)),
    }
}
