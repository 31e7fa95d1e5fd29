//! The gated-download pipeline.
//!
//! Every inbound message goes through the same ordered checks: commands,
//! then an open admin prompt, then the forced-channel gate, then link
//! classification and finally fetch → deliver → count. Failures are turned
//! into chat replies here; nothing escapes to the update loop.

use std::sync::Arc;

use {
    reelbot_media::{MediaFetcher, find_supported_link},
    reelbot_store::StoreHandle,
    teloxide::types::{ChatId, UserId},
    tracing::{debug, error, info, warn},
};

use crate::{
    Result,
    access::{AdminAllowlist, GateDecision, MembershipGate},
    admin::AdminController,
    config::BotConfig,
    handlers::{AdminCallback, InboundContent, InboundMessage, store_id},
    messages,
    outbound::ChatTransport,
    state::SessionStates,
};

/// Slash commands the bot answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Admin,
    Cancel,
}

impl Command {
    /// Parse the first word of a message, accepting the `/cmd@botname` form.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or(word);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "admin" => Some(Self::Admin),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    store: StoreHandle,
    fetcher: Arc<dyn MediaFetcher>,
    transport: Arc<dyn ChatTransport>,
    sessions: SessionStates,
    gate: MembershipGate,
    admin: Option<AdminController>,
}

impl Dispatcher {
    pub fn new(
        config: &BotConfig,
        store: StoreHandle,
        fetcher: Arc<dyn MediaFetcher>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let sessions = SessionStates::new();
        let admin = AdminController::new(
            AdminAllowlist::new(config.admin_ids.iter().copied()),
            store.clone(),
            Arc::clone(&transport),
            sessions.clone(),
            config.broadcast_concurrency,
        );
        if admin.is_none() {
            warn!("no admin ids configured, admin panel disabled");
        }
        Self {
            store,
            fetcher,
            gate: MembershipGate::new(Arc::clone(&transport)),
            transport,
            sessions,
            admin,
        }
    }

    pub async fn handle_inbound(&self, msg: InboundMessage) {
        let chat_id = msg.chat_id;
        let user_id = msg.sender.id;
        if let Err(e) = self.route(msg).await {
            error!(
                chat_id = chat_id.0,
                user_id = user_id.0,
                error = %e,
                "error handling telegram message"
            );
        }
    }

    async fn route(&self, msg: InboundMessage) -> Result<()> {
        let user_id = msg.sender.id;
        if let Some(profile) = msg.sender.profile() {
            self.store.upsert_user(&profile).await;
        }

        if let InboundContent::Text(text) = &msg.content
            && let Some(command) = Command::parse(text)
        {
            return self.handle_command(command, msg.chat_id, user_id).await;
        }

        // Taken before the consumer runs so the prompt is spent even when
        // the answer is rejected.
        if let Some(state) = self.sessions.take(user_id) {
            debug!(user_id = user_id.0, ?state, "consuming conversation state");
            return match &self.admin {
                Some(admin) => admin.resume(state, &msg).await,
                None => self.deny(msg.chat_id).await,
            };
        }

        let InboundContent::Text(text) = &msg.content else {
            debug!(user_id = user_id.0, "ignoring non-text message");
            return Ok(());
        };

        let channels = self.store.list_forced_channels().await;
        if let GateDecision::Denied { missing } = self.gate.check(user_id, &channels).await {
            self.transport
                .send_text(msg.chat_id, &messages::join_required(&missing), None)
                .await?;
            return Ok(());
        }

        let Some(url) = find_supported_link(text) else {
            self.transport
                .send_text(msg.chat_id, messages::INVALID_LINK, None)
                .await?;
            return Ok(());
        };

        self.process_download(msg.chat_id, user_id, url).await
    }

    async fn handle_command(
        &self,
        command: Command,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<()> {
        debug!(user_id = user_id.0, ?command, "command");
        match command {
            Command::Start | Command::Help => {
                self.transport
                    .send_text(chat_id, messages::WELCOME, None)
                    .await?;
            },
            Command::Admin => match &self.admin {
                Some(admin) => admin.show_menu(chat_id, user_id).await?,
                None => self.deny(chat_id).await?,
            },
            Command::Cancel => {
                let text = if self.sessions.take(user_id).is_some() {
                    messages::CANCELLED
                } else {
                    messages::NOTHING_TO_CANCEL
                };
                self.transport.send_text(chat_id, text, None).await?;
            },
        }
        Ok(())
    }

    async fn deny(&self, chat_id: ChatId) -> Result<()> {
        self.transport
            .send_text(chat_id, messages::NOT_ADMIN, None)
            .await?;
        Ok(())
    }

    /// Placeholder, fetch, deliver, count. The downloaded file is removed
    /// when it goes out of scope, whichever branch is taken.
    async fn process_download(&self, chat_id: ChatId, user_id: UserId, url: &str) -> Result<()> {
        let placeholder = self
            .transport
            .send_text(chat_id, messages::PROCESSING, None)
            .await?;

        let file = match self.fetcher.fetch(url).await {
            Ok(file) => file,
            Err(e) => {
                warn!(user_id = user_id.0, url, error = %e, "media fetch failed");
                self.transport
                    .edit_text(chat_id, placeholder, &messages::fetch_failed(&e), None)
                    .await?;
                return Ok(());
            },
        };

        match self
            .transport
            .send_document(chat_id, file.path(), messages::SUCCESS_CAPTION)
            .await
        {
            Ok(()) => {
                info!(user_id = user_id.0, url, "media delivered");
                if let Some(id) = store_id(user_id) {
                    self.store.increment_download_count(id).await;
                }
                if let Err(e) = self.transport.delete_message(chat_id, placeholder).await {
                    debug!(chat_id = chat_id.0, error = %e, "failed to delete placeholder");
                }
            },
            Err(e) => {
                warn!(user_id = user_id.0, url, error = %e, "media delivery failed");
                self.transport
                    .edit_text(chat_id, placeholder, &messages::delivery_failed(&e), None)
                    .await?;
            },
        }
        Ok(())
    }

    /// Inline keyboard press. Always acknowledged first.
    pub async fn handle_callback(&self, callback: AdminCallback) {
        if let Err(e) = self.transport.answer_callback(&callback.id).await {
            warn!(callback_id = %callback.id, error = %e, "failed to answer callback query");
        }
        let result = match &self.admin {
            Some(admin) => admin.handle_callback(&callback).await,
            None => self.deny(callback.chat_id).await,
        };
        if let Err(e) = result {
            error!(
                user_id = callback.from.0,
                error = %e,
                "error handling telegram callback query"
            );
        }
    }
}
