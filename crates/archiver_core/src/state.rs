use crate::FailureKind;

/// Lifecycle of one post's content fetch.
///
/// `attempt` counts network requests issued so far; `Fetching { attempt: 0 }`
/// is the cache lookup that precedes the first request. `retry` counts
/// scheduled retries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ItemState {
    #[default]
    Pending,
    Fetching { attempt: u32 },
    Retrying { retry: u32 },
    Succeeded { attempts: u32, from_cache: bool },
    Failed { attempts: u32, kind: FailureKind },
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Succeeded { .. } | ItemState::Failed { .. })
    }
}
