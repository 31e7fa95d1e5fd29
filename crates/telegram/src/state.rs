use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use teloxide::types::UserId;

/// What the next message from an admin answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Next text is an `@handle` or `-100…` channel id.
    AwaitingChannelSpec,
    /// Next message is fanned out to every known user.
    AwaitingBroadcast,
}

/// Per-user conversation state, owned by the dispatcher.
///
/// Lives only in memory. The lock is never held across `.await`.
#[derive(Clone, Default)]
pub struct SessionStates {
    inner: Arc<Mutex<HashMap<UserId, ConversationState>>>,
}

impl SessionStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: UserId, state: ConversationState) {
        self.lock().insert(user_id, state);
    }

    /// Remove and return the open state, so it is consumed exactly once.
    pub fn take(&self, user_id: UserId) -> Option<ConversationState> {
        self.lock().remove(&user_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, ConversationState>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl SessionStates {
    pub(crate) fn get(&self, user_id: UserId) -> Option<ConversationState> {
        self.lock().get(&user_id).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
