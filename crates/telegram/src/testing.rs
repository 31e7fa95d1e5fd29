//! In-process fakes for the transport, fetcher and store.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
};

use {
    async_trait::async_trait,
    reelbot_media::{DownloadedFile, MediaFetcher},
    reelbot_store::{NewForcedChannel, SqliteStore, StoreHandle},
    sqlx::sqlite::SqlitePoolOptions,
    teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId, UserId},
};

use crate::{
    Error, Result,
    admin::ChannelSpec,
    handlers::{InboundContent, InboundMessage, Sender},
    outbound::ChatTransport,
};

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SendText {
        chat_id: i64,
        text: String,
        has_menu: bool,
    },
    EditText {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    Document {
        chat_id: i64,
        path: PathBuf,
        caption: String,
        existed: bool,
    },
    Photo {
        chat_id: i64,
        file_id: String,
        caption: Option<String>,
    },
    Video {
        chat_id: i64,
        file_id: String,
        caption: Option<String>,
    },
    AnswerCallback(String),
}

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI32,
    /// `(channel_id, user_id)` pairs that count as joined.
    pub members: Mutex<HashSet<(i64, u64)>>,
    /// Channels whose membership lookup errors out.
    pub broken_channels: Mutex<HashSet<i64>>,
    /// Chats every send to which fails.
    pub failing_chats: Mutex<HashSet<i64>>,
    pub fail_documents: AtomicBool,
    /// Resolvable channels keyed by `@handle` or id string.
    pub channels: Mutex<HashMap<String, NewForcedChannel>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Texts sent or edited into `chat_id`, in order.
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendText { chat_id: c, text, .. } | Call::EditText { chat_id: c, text, .. }
                    if c == chat_id =>
                {
                    Some(text)
                },
                _ => None,
            })
            .collect()
    }

    pub fn join(&self, channel_id: i64, user_id: u64) {
        self.members
            .lock()
            .expect("members lock")
            .insert((channel_id, user_id));
    }

    pub fn add_channel(&self, key: &str, channel: NewForcedChannel) {
        self.channels
            .lock()
            .expect("channels lock")
            .insert(key.to_string(), channel);
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn check_chat(&self, chat_id: ChatId) -> Result<()> {
        if self
            .failing_chats
            .lock()
            .expect("failing lock")
            .contains(&chat_id.0)
        {
            return Err(Error::message(format!("chat {} blocked the bot", chat_id.0)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId> {
        self.check_chat(chat_id)?;
        self.record(Call::SendText {
            chat_id: chat_id.0,
            text: text.to_string(),
            has_menu: menu.is_some(),
        });
        Ok(MessageId(
            self.next_message_id.fetch_add(1, Ordering::SeqCst) + 100,
        ))
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _menu: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        self.record(Call::EditText {
            chat_id: chat_id.0,
            message_id: message_id.0,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.record(Call::Delete {
            chat_id: chat_id.0,
            message_id: message_id.0,
        });
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<()> {
        self.record(Call::Document {
            chat_id: chat_id.0,
            path: path.to_path_buf(),
            caption: caption.to_string(),
            existed: path.exists(),
        });
        if self.fail_documents.load(Ordering::SeqCst) {
            return Err(Error::message("Request Entity Too Large"));
        }
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.check_chat(chat_id)?;
        self.record(Call::Photo {
            chat_id: chat_id.0,
            file_id: file_id.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.check_chat(chat_id)?;
        self.record(Call::Video {
            chat_id: chat_id.0,
            file_id: file_id.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.record(Call::AnswerCallback(callback_id.to_string()));
        Ok(())
    }

    async fn is_member(&self, channel_id: ChatId, user_id: UserId) -> Result<bool> {
        if self
            .broken_channels
            .lock()
            .expect("broken lock")
            .contains(&channel_id.0)
        {
            return Err(Error::message("Bad Request: member list is inaccessible"));
        }
        Ok(self
            .members
            .lock()
            .expect("members lock")
            .contains(&(channel_id.0, user_id.0)))
    }

    async fn resolve_channel(&self, spec: &ChannelSpec) -> Result<NewForcedChannel> {
        let key = match spec {
            ChannelSpec::Handle(handle) => handle.clone(),
            ChannelSpec::Id(id) => id.to_string(),
        };
        self.channels
            .lock()
            .expect("channels lock")
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::message("Bad Request: chat not found"))
    }
}

/// Fetcher that writes a small file into `dir` for supported links.
pub struct MockFetcher {
    dir: PathBuf,
    pub fail_with: Mutex<Option<reelbot_media::Error>>,
    urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail_with: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.urls().len()
    }

    /// Links handed to the fetcher, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls lock").clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> reelbot_media::Result<DownloadedFile> {
        self.urls.lock().expect("urls lock").push(url.to_string());
        if let Some(err) = self.fail_with.lock().expect("fail lock").take() {
            return Err(err);
        }
        if reelbot_media::Platform::classify(url).is_none() {
            return Err(reelbot_media::Error::UnsupportedLink);
        }
        let path = self.dir.join("clip.mp4");
        std::fs::write(&path, b"video").expect("write fake download");
        Ok(DownloadedFile::new(path))
    }
}

/// Store on a private in-memory database.
pub async fn memory_store() -> StoreHandle {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    SqliteStore::init(&pool).await.expect("init schema");
    StoreHandle::Available(Arc::new(SqliteStore::with_pool(pool)))
}

pub fn sender(id: u64) -> Sender {
    Sender {
        id: UserId(id),
        username: Some(format!("user{id}")),
        first_name: format!("User {id}"),
        last_name: None,
    }
}

pub fn text_from(id: u64, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(id as i64),
        sender: sender(id),
        content: InboundContent::Text(text.to_string()),
    }
}
