//! Admin panel: statistics, forced-channel registration and broadcasts.

use std::sync::Arc;

use {
    futures::{StreamExt, stream},
    reelbot_store::{StoreHandle, now_secs},
    teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, UserId},
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    access::AdminAllowlist,
    handlers::{AdminCallback, InboundContent, InboundMessage},
    messages,
    outbound::ChatTransport,
    state::{ConversationState, SessionStates},
};

/// Channel reference typed by an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSpec {
    /// Public channel handle, including the leading `@`.
    Handle(String),
    /// Numeric id of the form `-100…`.
    Id(i64),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("expected @channel_username or a -100… channel id, got {input:?}")]
pub struct ChannelSpecError {
    pub input: String,
}

impl ChannelSpec {
    pub fn parse(input: &str) -> std::result::Result<Self, ChannelSpecError> {
        let trimmed = input.trim();
        let invalid = || ChannelSpecError {
            input: trimmed.to_string(),
        };

        if let Some(handle) = trimmed.strip_prefix('@') {
            let valid = !handle.is_empty()
                && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            return if valid {
                Ok(Self::Handle(trimmed.to_string()))
            } else {
                Err(invalid())
            };
        }

        if trimmed.starts_with("-100") {
            return trimmed.parse().map(Self::Id).map_err(|_| invalid());
        }

        Err(invalid())
    }
}

/// Inline keyboard actions. The callback data strings are part of the
/// keyboard contract and must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Stats,
    AddChannel,
    ListChannels,
    Broadcast,
    Back,
}

impl AdminAction {
    pub fn parse(data: &str) -> Option<Self> {
        Some(match data {
            "admin_stats" => Self::Stats,
            "admin_add_channel" => Self::AddChannel,
            "admin_list_channels" => Self::ListChannels,
            "admin_broadcast" => Self::Broadcast,
            "admin_back" => Self::Back,
            _ => return None,
        })
    }

    pub fn callback_data(self) -> &'static str {
        match self {
            Self::Stats => "admin_stats",
            Self::AddChannel => "admin_add_channel",
            Self::ListChannels => "admin_list_channels",
            Self::Broadcast => "admin_broadcast",
            Self::Back => "admin_back",
        }
    }
}

fn button(label: &str, action: AdminAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.callback_data())
}

pub fn menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("\u{1f4ca} Statistics", AdminAction::Stats),
            button("\u{2795} Add channel", AdminAction::AddChannel),
        ],
        vec![
            button("\u{1f4e2} Broadcast", AdminAction::Broadcast),
            button("\u{1f4cb} Channels", AdminAction::ListChannels),
        ],
    ])
}

fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("\u{2b05}\u{fe0f} Back", AdminAction::Back)]])
}

/// What an admin asked to fan out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastContent {
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
}

impl BroadcastContent {
    fn from_inbound(content: &InboundContent) -> Option<Self> {
        match content {
            InboundContent::Text(text) if !text.trim().is_empty() => {
                Some(Self::Text(text.clone()))
            },
            InboundContent::Photo { file_id, caption } => Some(Self::Photo {
                file_id: file_id.clone(),
                caption: caption.clone(),
            }),
            InboundContent::Video { file_id, caption } => Some(Self::Video {
                file_id: file_id.clone(),
                caption: caption.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success: usize,
    pub failure: usize,
}

/// Privileged operations, gated on [`AdminAllowlist`] at every entry point.
pub struct AdminController {
    allowlist: AdminAllowlist,
    store: StoreHandle,
    transport: Arc<dyn ChatTransport>,
    sessions: SessionStates,
    broadcast_concurrency: usize,
}

impl AdminController {
    /// `None` when nobody is allowed to administer the bot.
    pub fn new(
        allowlist: AdminAllowlist,
        store: StoreHandle,
        transport: Arc<dyn ChatTransport>,
        sessions: SessionStates,
        broadcast_concurrency: usize,
    ) -> Option<Self> {
        if allowlist.is_empty() {
            return None;
        }
        Some(Self {
            allowlist,
            store,
            transport,
            sessions,
            broadcast_concurrency: broadcast_concurrency.max(1),
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.allowlist.contains(user_id)
    }

    /// `/admin`.
    pub async fn show_menu(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        if !self.is_admin(user_id) {
            warn!(user_id = user_id.0, "non-admin requested the admin panel");
            self.transport
                .send_text(chat_id, messages::NOT_ADMIN, None)
                .await?;
            return Ok(());
        }
        self.transport
            .send_text(chat_id, messages::ADMIN_MENU, Some(menu_keyboard()))
            .await?;
        Ok(())
    }

    /// Inline keyboard press. The callback has already been acknowledged.
    pub async fn handle_callback(&self, callback: &AdminCallback) -> Result<()> {
        if !self.is_admin(callback.from) {
            warn!(user_id = callback.from.0, "non-admin pressed an admin button");
            self.transport
                .send_text(callback.chat_id, messages::NOT_ADMIN, None)
                .await?;
            return Ok(());
        }

        let Some(action) = callback.data.as_deref().and_then(AdminAction::parse) else {
            debug!(data = ?callback.data, "ignoring unknown callback data");
            return Ok(());
        };
        debug!(user_id = callback.from.0, ?action, "admin action");

        match action {
            AdminAction::Stats => {
                let stats = self.store.statistics().await;
                let channels = self.store.list_forced_channels().await;
                let text = messages::statistics(&stats, channels.len(), &self.allowlist.ids());
                self.render(callback, &text, back_keyboard()).await
            },
            AdminAction::ListChannels => {
                let channels = self.store.list_forced_channels().await;
                self.render(callback, &messages::channel_list(&channels), back_keyboard())
                    .await
            },
            AdminAction::AddChannel => {
                self.sessions
                    .set(callback.from, ConversationState::AwaitingChannelSpec);
                self.transport
                    .send_text(callback.chat_id, messages::CHANNEL_PROMPT, None)
                    .await?;
                Ok(())
            },
            AdminAction::Broadcast => {
                self.sessions
                    .set(callback.from, ConversationState::AwaitingBroadcast);
                self.transport
                    .send_text(callback.chat_id, messages::BROADCAST_PROMPT, None)
                    .await?;
                Ok(())
            },
            AdminAction::Back => {
                self.render(callback, messages::ADMIN_MENU, menu_keyboard())
                    .await
            },
        }
    }

    /// Edit the keyboard message in place, or send a new one.
    async fn render(
        &self,
        callback: &AdminCallback,
        text: &str,
        menu: InlineKeyboardMarkup,
    ) -> Result<()> {
        match callback.message_id {
            Some(message_id) => {
                self.transport
                    .edit_text(callback.chat_id, message_id, text, Some(menu))
                    .await
            },
            None => {
                self.transport
                    .send_text(callback.chat_id, text, Some(menu))
                    .await?;
                Ok(())
            },
        }
    }

    /// Consume the message that answers an open prompt. The state has
    /// already been removed by the caller.
    pub async fn resume(&self, state: ConversationState, msg: &InboundMessage) -> Result<()> {
        if !self.is_admin(msg.sender.id) {
            warn!(user_id = msg.sender.id.0, ?state, "non-admin held admin state");
            self.transport
                .send_text(msg.chat_id, messages::NOT_ADMIN, None)
                .await?;
            return Ok(());
        }

        match state {
            ConversationState::AwaitingChannelSpec => match &msg.content {
                InboundContent::Text(input) => self.add_channel(msg.chat_id, input).await,
                _ => {
                    self.transport
                        .send_text(msg.chat_id, messages::CHANNEL_FORMAT_ERROR, None)
                        .await?;
                    Ok(())
                },
            },
            ConversationState::AwaitingBroadcast => {
                match BroadcastContent::from_inbound(&msg.content) {
                    Some(content) => {
                        self.broadcast(msg.chat_id, &content).await?;
                        Ok(())
                    },
                    None => {
                        self.transport
                            .send_text(msg.chat_id, messages::BROADCAST_EMPTY, None)
                            .await?;
                        Ok(())
                    },
                }
            },
        }
    }

    /// Parse, resolve and persist a forced channel, replying with the outcome.
    pub async fn add_channel(&self, chat_id: ChatId, input: &str) -> Result<()> {
        let spec = match ChannelSpec::parse(input) {
            Ok(spec) => spec,
            Err(e) => {
                debug!(error = %e, "rejected channel spec");
                self.transport
                    .send_text(chat_id, messages::CHANNEL_FORMAT_ERROR, None)
                    .await?;
                return Ok(());
            },
        };

        let channel = match self.transport.resolve_channel(&spec).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(input, error = %e, "channel lookup failed");
                self.transport
                    .send_text(chat_id, &messages::channel_unresolved(input.trim(), &e), None)
                    .await?;
                return Ok(());
            },
        };

        let reply = if self.store.upsert_forced_channel(&channel).await {
            info!(
                channel_id = channel.channel_id,
                channel = ?channel.channel_username,
                "forced channel added"
            );
            messages::channel_added(&channel.channel_title)
        } else {
            messages::CHANNEL_ADD_FAILED.to_string()
        };
        self.transport.send_text(chat_id, &reply, None).await?;
        Ok(())
    }

    /// Fan `content` out to every known user with bounded concurrency.
    /// Per-recipient failures are counted and never abort the batch.
    pub async fn broadcast(
        &self,
        chat_id: ChatId,
        content: &BroadcastContent,
    ) -> Result<BroadcastReport> {
        let recipients = self.store.list_user_ids().await;
        info!(recipients = recipients.len(), "starting broadcast");
        self.transport
            .send_text(chat_id, &messages::broadcast_started(recipients.len()), None)
            .await?;

        let report = stream::iter(recipients)
            .map(|user_id| async move {
                let result = self.deliver(ChatId(user_id), content).await;
                if let Err(ref e) = result {
                    debug!(user_id, error = %e, "broadcast delivery failed");
                }
                result.is_ok()
            })
            .buffer_unordered(self.broadcast_concurrency)
            .fold(BroadcastReport::default(), |mut report, delivered| async move {
                if delivered {
                    report.success += 1;
                } else {
                    report.failure += 1;
                }
                report
            })
            .await;

        self.store.record_broadcast(now_secs()).await;
        info!(
            success = report.success,
            failure = report.failure,
            "broadcast finished"
        );
        self.transport
            .send_text(
                chat_id,
                &messages::broadcast_finished(report.success, report.failure),
                None,
            )
            .await?;
        Ok(report)
    }

    async fn deliver(&self, chat_id: ChatId, content: &BroadcastContent) -> Result<()> {
        match content {
            BroadcastContent::Text(text) => {
                self.transport
                    .send_text(chat_id, &messages::escape_html(text), None)
                    .await?;
                Ok(())
            },
            BroadcastContent::Photo { file_id, caption } => {
                self.transport
                    .send_photo(chat_id, file_id, caption.as_deref())
                    .await
            },
            BroadcastContent::Video { file_id, caption } => {
                self.transport
                    .send_video(chat_id, file_id, caption.as_deref())
                    .await
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{Call, MockTransport, memory_store, sender, text_from},
        reelbot_store::{NewForcedChannel, UserProfile},
        rstest::rstest,
    };

    const ADMIN: u64 = 1;

    fn controller(transport: &Arc<MockTransport>, store: StoreHandle) -> AdminController {
        AdminController::new(
            AdminAllowlist::new([ADMIN as i64]),
            store,
            Arc::clone(transport) as Arc<dyn ChatTransport>,
            SessionStates::new(),
            4,
        )
        .expect("allowlist is not empty")
    }

    fn callback(from: u64, data: &str) -> AdminCallback {
        AdminCallback {
            id: "cb".into(),
            from: UserId(from),
            chat_id: ChatId(from as i64),
            message_id: Some(teloxide::types::MessageId(5)),
            data: Some(data.into()),
        }
    }

    async fn seed_users(store: &StoreHandle, ids: &[i64]) {
        for &id in ids {
            store
                .upsert_user(&UserProfile {
                    user_id: id,
                    username: None,
                    first_name: format!("User {id}"),
                    last_name: None,
                })
                .await;
        }
    }

    #[rstest]
    #[case("-1001234567890", Ok(ChannelSpec::Id(-1001234567890)))]
    #[case("  @news_channel ", Ok(ChannelSpec::Handle("@news_channel".into())))]
    #[case("not-a-channel", Err(()))]
    #[case("@", Err(()))]
    #[case("@bad handle", Err(()))]
    #[case("-100abc", Err(()))]
    #[case("12345", Err(()))]
    fn channel_spec_parsing(
        #[case] input: &str,
        #[case] expected: std::result::Result<ChannelSpec, ()>,
    ) {
        assert_eq!(ChannelSpec::parse(input).map_err(|_| ()), expected);
    }

    #[test]
    fn callback_data_round_trips() {
        for action in [
            AdminAction::Stats,
            AdminAction::AddChannel,
            AdminAction::ListChannels,
            AdminAction::Broadcast,
            AdminAction::Back,
        ] {
            assert_eq!(AdminAction::parse(action.callback_data()), Some(action));
        }
        assert_eq!(AdminAction::parse("sessions_switch:1"), None);
    }

    #[tokio::test]
    async fn empty_allowlist_disables_the_controller() {
        let transport = MockTransport::new();
        let controller = AdminController::new(
            AdminAllowlist::default(),
            StoreHandle::Unavailable,
            transport as Arc<dyn ChatTransport>,
            SessionStates::new(),
            4,
        );
        assert!(controller.is_none());
    }

    #[tokio::test]
    async fn non_admin_is_denied_everywhere() {
        let transport = MockTransport::new();
        let admin = controller(&transport, StoreHandle::Unavailable);

        admin.show_menu(ChatId(2), UserId(2)).await.unwrap();
        admin
            .handle_callback(&callback(2, "admin_broadcast"))
            .await
            .unwrap();
        admin
            .resume(ConversationState::AwaitingBroadcast, &text_from(2, "spam"))
            .await
            .unwrap();

        assert_eq!(transport.texts_to(2), vec![messages::NOT_ADMIN; 3]);
        assert!(admin.sessions.is_empty());
    }

    #[tokio::test]
    async fn admin_menu_has_keyboard() {
        let transport = MockTransport::new();
        let admin = controller(&transport, StoreHandle::Unavailable);
        admin.show_menu(ChatId(1), UserId(ADMIN)).await.unwrap();
        assert_eq!(transport.calls(), vec![Call::SendText {
            chat_id: 1,
            text: messages::ADMIN_MENU.into(),
            has_menu: true,
        }]);
    }

    #[tokio::test]
    async fn prompts_open_conversation_state() {
        let transport = MockTransport::new();
        let admin = controller(&transport, StoreHandle::Unavailable);

        admin
            .handle_callback(&callback(ADMIN, "admin_add_channel"))
            .await
            .unwrap();
        assert_eq!(
            admin.sessions.get(UserId(ADMIN)),
            Some(ConversationState::AwaitingChannelSpec)
        );

        admin
            .handle_callback(&callback(ADMIN, "admin_broadcast"))
            .await
            .unwrap();
        assert_eq!(
            admin.sessions.get(UserId(ADMIN)),
            Some(ConversationState::AwaitingBroadcast)
        );
        assert_eq!(transport.texts_to(1), vec![
            messages::CHANNEL_PROMPT,
            messages::BROADCAST_PROMPT
        ]);
    }

    #[tokio::test]
    async fn stats_edit_the_menu_message() {
        let transport = MockTransport::new();
        let store = memory_store().await;
        seed_users(&store, &[10, 11]).await;
        store.increment_download_count(10).await;
        let admin = controller(&transport, store);

        admin
            .handle_callback(&callback(ADMIN, "admin_stats"))
            .await
            .unwrap();

        let calls = transport.calls();
        let [Call::EditText { message_id, text, .. }] = calls.as_slice() else {
            panic!("expected a single edit, got {calls:?}");
        };
        assert_eq!(*message_id, 5);
        assert!(text.contains("Users: <code>2</code>"));
        assert!(text.contains("Downloads: <code>1</code>"));
        assert!(text.contains("Admins: <code>1</code>"));
    }

    #[tokio::test]
    async fn add_channel_resolves_before_persisting() {
        let transport = MockTransport::new();
        transport.add_channel("-1001234567890", NewForcedChannel {
            channel_id: -1001234567890,
            channel_username: None,
            channel_title: "Private news".into(),
        });
        let store = memory_store().await;
        let admin = controller(&transport, store.clone());

        admin
            .add_channel(ChatId(1), "-1001234567890")
            .await
            .unwrap();

        let channels = store.list_forced_channels().await;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_id, -1001234567890);
        assert_eq!(channels[0].channel_username, None);
        assert_eq!(transport.texts_to(1), vec![messages::channel_added(
            "Private news"
        )]);
    }

    #[tokio::test]
    async fn unresolved_channel_is_not_stored() {
        let transport = MockTransport::new();
        let store = memory_store().await;
        let admin = controller(&transport, store.clone());

        admin.add_channel(ChatId(1), "@ghost").await.unwrap();

        assert!(store.list_forced_channels().await.is_empty());
        let texts = transport.texts_to(1);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Could not look up @ghost"));
    }

    #[tokio::test]
    async fn malformed_channel_spec_replies_with_format_error() {
        let transport = MockTransport::new();
        let admin = controller(&transport, StoreHandle::Unavailable);
        admin
            .resume(
                ConversationState::AwaitingChannelSpec,
                &text_from(ADMIN, "not-a-channel"),
            )
            .await
            .unwrap();
        assert_eq!(transport.texts_to(1), vec![messages::CHANNEL_FORMAT_ERROR]);
    }

    #[tokio::test]
    async fn broadcast_counts_failures_without_aborting() {
        let transport = MockTransport::new();
        transport
            .failing_chats
            .lock()
            .unwrap()
            .extend([12_i64, 14]);
        let store = memory_store().await;
        seed_users(&store, &[10, 11, 12, 13, 14]).await;
        let admin = controller(&transport, store.clone());

        let report = admin
            .broadcast(ChatId(1), &BroadcastContent::Text("<hello>".into()))
            .await
            .unwrap();

        assert_eq!(report, BroadcastReport {
            success: 3,
            failure: 2
        });
        let texts = transport.texts_to(1);
        assert_eq!(texts.first(), Some(&messages::broadcast_started(5)));
        assert_eq!(texts.last(), Some(&messages::broadcast_finished(3, 2)));
        assert_eq!(transport.texts_to(10), vec!["&lt;hello&gt;".to_string()]);
        assert!(store.statistics().await.last_broadcast.is_some());
    }

    #[tokio::test]
    async fn broadcast_forwards_photos_by_file_id() {
        let transport = MockTransport::new();
        let store = memory_store().await;
        seed_users(&store, &[10]).await;
        let admin = controller(&transport, store);

        let mut msg = text_from(ADMIN, "");
        msg.sender = sender(ADMIN);
        msg.content = InboundContent::Photo {
            file_id: "photo-id".into(),
            caption: Some("news".into()),
        };
        admin
            .resume(ConversationState::AwaitingBroadcast, &msg)
            .await
            .unwrap();

        assert!(transport.calls().contains(&Call::Photo {
            chat_id: 10,
            file_id: "photo-id".into(),
            caption: Some("news".into()),
        }));
    }

    #[tokio::test]
    async fn broadcast_without_content_is_rejected() {
        let transport = MockTransport::new();
        let admin = controller(&transport, StoreHandle::Unavailable);
        let mut msg = text_from(ADMIN, "");
        msg.content = InboundContent::Unsupported;
        admin
            .resume(ConversationState::AwaitingBroadcast, &msg)
            .await
            .unwrap();
        assert_eq!(transport.texts_to(1), vec![messages::BROADCAST_EMPTY]);
    }
}
