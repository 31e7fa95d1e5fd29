use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock},
};

use {
    reelbot_store::ForcedChannel,
    teloxide::types::{ChatId, UserId},
    tracing::{debug, warn},
};

use crate::{handlers::store_id, outbound::ChatTransport};

/// Admin user ids, shared by every component that performs privileged work.
///
/// Membership is checked at the point of use, so [`AdminAllowlist::replace`]
/// takes effect without a restart.
#[derive(Clone, Default)]
pub struct AdminAllowlist {
    ids: Arc<RwLock<BTreeSet<i64>>>,
}

impl AdminAllowlist {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: Arc::new(RwLock::new(ids.into_iter().collect())),
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        let Some(id) = store_id(user_id) else {
            return false;
        };
        self.ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Swap in a new set of admin ids.
    pub fn replace(&self, ids: impl IntoIterator<Item = i64>) {
        *self.ids.write().unwrap_or_else(|e| e.into_inner()) = ids.into_iter().collect();
    }
}

/// Outcome of the forced-channel check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// The user has not joined these channels yet.
    Denied { missing: Vec<ForcedChannel> },
}

/// Decides whether a user has joined every forced channel.
#[derive(Clone)]
pub struct MembershipGate {
    transport: Arc<dyn ChatTransport>,
}

impl MembershipGate {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// An empty channel list always allows. A failed membership lookup counts
    /// as not joined.
    pub async fn check(&self, user_id: UserId, channels: &[ForcedChannel]) -> GateDecision {
        let mut missing = Vec::new();
        for channel in channels {
            let joined = match self
                .transport
                .is_member(ChatId(channel.channel_id), user_id)
                .await
            {
                Ok(joined) => joined,
                Err(e) => {
                    warn!(
                        user_id = user_id.0,
                        channel_id = channel.channel_id,
                        error = %e,
                        "membership lookup failed"
                    );
                    false
                },
            };
            if !joined {
                missing.push(channel.clone());
            }
        }

        if missing.is_empty() {
            GateDecision::Allowed
        } else {
            debug!(
                user_id = user_id.0,
                missing = missing.len(),
                "user has not joined forced channels"
            );
            GateDecision::Denied { missing }
        }
    }
}
