//! Telegram front end for the media download bot.
//!
//! Turns teloxide updates into dispatcher calls, runs the gated-download
//! pipeline and the admin panel, and talks back through [`ChatTransport`].

pub mod access;
pub mod admin;
pub mod bot;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod outbound;
pub mod state;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing;

pub use {
    access::{AdminAllowlist, GateDecision, MembershipGate},
    admin::{AdminController, BroadcastReport, ChannelSpec},
    config::{BotConfig, UpdateMode},
    dispatcher::Dispatcher,
    error::{Error, Result},
    outbound::{ChatTransport, TelegramOutbound},
    state::{ConversationState, SessionStates},
};
