use crate::{ItemDirective, ItemEvent, ItemState, RetryPolicy};

/// Pure transition function: applies an event to an item and returns the next directive.
///
/// Events that make no sense in the current state leave it untouched and
/// yield `ItemDirective::Ignore`.
pub fn advance(
    state: ItemState,
    event: ItemEvent,
    policy: &RetryPolicy,
) -> (ItemState, ItemDirective) {
    match (state, event) {
        (ItemState::Pending, ItemEvent::Dispatched) => {
            (ItemState::Fetching { attempt: 0 }, ItemDirective::LookupCache)
        }
        (ItemState::Fetching { attempt: 0 }, ItemEvent::CacheHit) => (
            ItemState::Succeeded {
                attempts: 0,
                from_cache: true,
            },
            ItemDirective::Finish,
        ),
        (ItemState::Fetching { attempt: 0 }, ItemEvent::CacheMiss) => {
            (ItemState::Fetching { attempt: 1 }, ItemDirective::Request)
        }
        (ItemState::Fetching { attempt }, ItemEvent::ResponseReady) if attempt > 0 => (
            ItemState::Succeeded {
                attempts: attempt,
                from_cache: false,
            },
            ItemDirective::Finish,
        ),
        (ItemState::Fetching { attempt }, ItemEvent::AttemptFailed(kind)) if attempt > 0 => {
            let retries_used = attempt - 1;
            if kind.is_retryable() && retries_used < policy.max_retries {
                let retry = retries_used + 1;
                (
                    ItemState::Retrying { retry },
                    ItemDirective::Wait(policy.delay_for(retry)),
                )
            } else {
                (
                    ItemState::Failed {
                        attempts: attempt,
                        kind,
                    },
                    ItemDirective::Finish,
                )
            }
        }
        (ItemState::Retrying { retry }, ItemEvent::BackoffElapsed) => (
            ItemState::Fetching { attempt: retry + 1 },
            ItemDirective::Request,
        ),
        (state, _) => (state, ItemDirective::Ignore),
    }
}
