//! Conversion from teloxide updates to the dispatcher's inbound types.

use {
    reelbot_store::UserProfile,
    teloxide::types::{
        CallbackQuery, ChatId, MediaKind, Message, MessageId, MessageKind, Update, UpdateKind, User,
        UserId,
    },
    tracing::debug,
};

use crate::dispatcher::Dispatcher;

/// Who sent an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }

    pub fn store_id(&self) -> Option<i64> {
        store_id(self.id)
    }

    /// Store representation, `None` when the id does not fit the store.
    pub fn profile(&self) -> Option<UserProfile> {
        Some(UserProfile {
            user_id: self.store_id()?,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        })
    }
}

/// Signed id the store keys users by. Telegram never issues ids above
/// `i64::MAX`, anything else maps to `None`.
pub fn store_id(user_id: UserId) -> Option<i64> {
    i64::try_from(user_id.0).ok()
}

/// Message payload the pipeline understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    /// Largest size of the photo, referenced by file id.
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    /// Stickers, documents, locations and everything else.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: Sender,
    pub content: InboundContent,
}

/// Inline keyboard press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCallback {
    pub id: String,
    pub from: UserId,
    pub chat_id: ChatId,
    /// Message carrying the keyboard, edited in place when known.
    pub message_id: Option<MessageId>,
    pub data: Option<String>,
}

/// Extract the dispatcher view of a message. Messages without a human sender
/// (channel posts, other bots) yield `None`.
pub fn inbound_from_message(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from.as_ref().filter(|u| !u.is_bot)?;
    let content = match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => InboundContent::Text(t.text.clone()),
            MediaKind::Photo(p) => match p.photo.last() {
                Some(size) => InboundContent::Photo {
                    file_id: size.file.id.clone(),
                    caption: p.caption.clone(),
                },
                None => InboundContent::Unsupported,
            },
            MediaKind::Video(v) => InboundContent::Video {
                file_id: v.video.file.id.clone(),
                caption: v.caption.clone(),
            },
            _ => InboundContent::Unsupported,
        },
        _ => InboundContent::Unsupported,
    };
    Some(InboundMessage {
        chat_id: msg.chat.id,
        sender: Sender::from_user(user),
        content,
    })
}

pub fn callback_from_query(query: &CallbackQuery) -> AdminCallback {
    let message = query.message.as_ref();
    AdminCallback {
        id: query.id.to_string(),
        from: query.from.id,
        // Without the originating message, reply in the user's private chat.
        chat_id: message
            .map(|m| m.chat().id)
            .unwrap_or_else(|| ChatId::from(query.from.id)),
        message_id: message.map(|m| m.id()),
        data: query.data.clone(),
    }
}

/// Route one update to the dispatcher. Errors are handled inside.
pub async fn handle_update(dispatcher: &Dispatcher, update: Update) {
    match update.kind {
        UpdateKind::Message(msg) => match inbound_from_message(&msg) {
            Some(inbound) => {
                debug!(
                    chat_id = inbound.chat_id.0,
                    user_id = inbound.sender.id.0,
                    "received telegram message"
                );
                dispatcher.handle_inbound(inbound).await;
            },
            None => debug!(chat_id = msg.chat.id.0, "ignoring message without a user"),
        },
        UpdateKind::CallbackQuery(query) => {
            debug!(callback_data = ?query.data, "received telegram callback query");
            dispatcher.handle_callback(callback_from_query(&query)).await;
        },
        other => debug!("ignoring non-message update: {other:?}"),
    }
}
