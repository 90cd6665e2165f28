use std::sync::Once;
use std::time::Duration;

use archiver_core::{advance, FailureKind, ItemDirective, ItemEvent, ItemState, RetryPolicy};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(archiver_logging::initialize_for_tests);
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(10),
        backoff_factor: 2.0,
        max_delay: Duration::from_secs(5),
    }
}

fn dispatch_to_first_request(p: &RetryPolicy) -> ItemState {
    let (state, directive) = advance(ItemState::Pending, ItemEvent::Dispatched, p);
    assert_eq!(directive, ItemDirective::LookupCache);
    let (state, directive) = advance(state, ItemEvent::CacheMiss, p);
    assert_eq!(directive, ItemDirective::Request);
    assert_eq!(state, ItemState::Fetching { attempt: 1 });
    state
}

#[test]
fn cache_hit_finishes_without_requests() {
    init_logging();
    let p = policy(3);
    let (state, _) = advance(ItemState::Pending, ItemEvent::Dispatched, &p);
    let (state, directive) = advance(state, ItemEvent::CacheHit, &p);

    assert_eq!(directive, ItemDirective::Finish);
    assert_eq!(
        state,
        ItemState::Succeeded {
            attempts: 0,
            from_cache: true
        }
    );
}

#[test]
fn first_response_succeeds() {
    init_logging();
    let p = policy(3);
    let state = dispatch_to_first_request(&p);
    let (state, directive) = advance(state, ItemEvent::ResponseReady, &p);

    assert_eq!(directive, ItemDirective::Finish);
    assert_eq!(
        state,
        ItemState::Succeeded {
            attempts: 1,
            from_cache: false
        }
    );
}

#[test]
fn always_failing_item_retries_exactly_max_retries_times() {
    init_logging();
    let p = policy(3);
    let mut state = dispatch_to_first_request(&p);
    let mut retries = 0;
    let mut waits = Vec::new();

    loop {
        let (next, directive) = advance(state, ItemEvent::AttemptFailed(FailureKind::Timeout), &p);
        state = next;
        match directive {
            ItemDirective::Wait(delay) => {
                retries += 1;
                waits.push(delay);
                let (next, directive) = advance(state, ItemEvent::BackoffElapsed, &p);
                assert_eq!(directive, ItemDirective::Request);
                state = next;
            }
            ItemDirective::Finish => break,
            other => panic!("unexpected directive {other:?}"),
        }
    }

    assert_eq!(retries, 3);
    assert_eq!(
        waits,
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40)
        ]
    );
    assert_eq!(
        state,
        ItemState::Failed {
            attempts: 4,
            kind: FailureKind::Timeout
        }
    );
}

#[test]
fn non_retryable_status_fails_immediately() {
    init_logging();
    let p = policy(3);
    let state = dispatch_to_first_request(&p);
    let (state, directive) = advance(
        state,
        ItemEvent::AttemptFailed(FailureKind::HttpStatus { status: 404 }),
        &p,
    );

    assert_eq!(directive, ItemDirective::Finish);
    assert_eq!(
        state,
        ItemState::Failed {
            attempts: 1,
            kind: FailureKind::HttpStatus { status: 404 }
        }
    );
}

#[test]
fn retryable_statuses_schedule_backoff() {
    init_logging();
    let p = policy(1);
    for status in [429, 500, 502, 503, 504] {
        let state = dispatch_to_first_request(&p);
        let (state, directive) = advance(
            state,
            ItemEvent::AttemptFailed(FailureKind::HttpStatus { status }),
            &p,
        );
        assert_eq!(state, ItemState::Retrying { retry: 1 }, "status {status}");
        assert_eq!(directive, ItemDirective::Wait(Duration::from_millis(10)));
    }
}

#[test]
fn success_after_retry_counts_attempts() {
    init_logging();
    let p = policy(2);
    let state = dispatch_to_first_request(&p);
    let (state, _) = advance(state, ItemEvent::AttemptFailed(FailureKind::Network), &p);
    let (state, _) = advance(state, ItemEvent::BackoffElapsed, &p);
    let (state, directive) = advance(state, ItemEvent::ResponseReady, &p);

    assert_eq!(directive, ItemDirective::Finish);
    assert_eq!(
        state,
        ItemState::Succeeded {
            attempts: 2,
            from_cache: false
        }
    );
    assert!(state.is_terminal());
}

#[test]
fn zero_retry_policy_fails_on_first_transient_error() {
    init_logging();
    let p = policy(0);
    let state = dispatch_to_first_request(&p);
    let (state, directive) = advance(state, ItemEvent::AttemptFailed(FailureKind::Timeout), &p);
    assert_eq!(directive, ItemDirective::Finish);
    assert!(matches!(state, ItemState::Failed { attempts: 1, .. }));
}

#[test]
fn out_of_order_events_are_ignored() {
    init_logging();
    let p = policy(3);
    let (state, directive) = advance(ItemState::Pending, ItemEvent::ResponseReady, &p);
    assert_eq!(state, ItemState::Pending);
    assert_eq!(directive, ItemDirective::Ignore);

    // A cache hit after the network phase began must not short-circuit retries.
    let state = dispatch_to_first_request(&p);
    let (state, directive) = advance(state, ItemEvent::CacheHit, &p);
    assert_eq!(state, ItemState::Fetching { attempt: 1 });
    assert_eq!(directive, ItemDirective::Ignore);

    let done = ItemState::Succeeded {
        attempts: 1,
        from_cache: false,
    };
    let (state, directive) = advance(done.clone(), ItemEvent::Dispatched, &p);
    assert_eq!(state, done);
    assert_eq!(directive, ItemDirective::Ignore);
}
