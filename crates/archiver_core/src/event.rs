use crate::FailureKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    /// A worker picked the item up.
    Dispatched,
    /// The cache held a clean payload for the link.
    CacheHit,
    /// Nothing cached (or caching disabled).
    CacheMiss,
    /// Request succeeded and the body was sanitized.
    ResponseReady,
    /// The current request failed.
    AttemptFailed(FailureKind),
    /// The scheduled backoff delay has passed.
    BackoffElapsed,
}
