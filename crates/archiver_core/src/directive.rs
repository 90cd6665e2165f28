use std::time::Duration;

/// What the worker driving an item must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDirective {
    /// Consult the cache before touching the network.
    LookupCache,
    /// Issue a network request.
    Request,
    /// Sleep, then report `BackoffElapsed`.
    Wait(Duration),
    /// The item reached a terminal state.
    Finish,
    /// The event does not apply to the current state.
    Ignore,
}
