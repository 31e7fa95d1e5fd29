use crate::platform::Platform;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The link does not belong to any supported platform.
    #[error("unsupported link, send a YouTube or Instagram URL")]
    UnsupportedLink,

    /// The extraction tool failed (network, geo-block, removed content, ...).
    #[error("download from {platform} failed: {message}")]
    Extraction { platform: Platform, message: String },

    #[error("file is too large to send ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    #[must_use]
    pub fn extraction(platform: Platform, message: impl Into<String>) -> Self {
        Self::Extraction {
            platform,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
