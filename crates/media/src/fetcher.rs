use std::path::PathBuf;

use {
    async_trait::async_trait,
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    cleanup::DownloadedFile,
    extractor::{ExtractRequest, Extractor, YtDlpExtractor},
    platform::Platform,
};

/// Telegram refuses bot uploads above 50 MB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Where fetched files land and how large they may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub download_dir: PathBuf,
    pub max_file_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// URL in, scoped local file out.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<DownloadedFile>;
}

/// Dispatches a link to its platform handler and runs the extractor with that
/// platform's profile.
pub struct PlatformFetcher<E = YtDlpExtractor> {
    extractor: E,
    config: FetchConfig,
}

impl<E: Extractor> PlatformFetcher<E> {
    pub fn new(extractor: E, config: FetchConfig) -> Self {
        Self { extractor, config }
    }
}

#[async_trait]
impl<E: Extractor> MediaFetcher for PlatformFetcher<E> {
    async fn fetch(&self, url: &str) -> Result<DownloadedFile> {
        let platform = Platform::classify(url).ok_or(Error::UnsupportedLink)?;

        tokio::fs::create_dir_all(&self.config.download_dir)
            .await
            .map_err(|e| {
                Error::io(
                    format!(
                        "failed to create download directory {}",
                        self.config.download_dir.display()
                    ),
                    e,
                )
            })?;

        // Every attempt writes into its own directory. Dropping it on any
        // exit path takes partial and fragment files along.
        let scratch = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(&self.config.download_dir)
            .map_err(|e| Error::io("failed to create scratch directory", e))?;

        let request = ExtractRequest {
            platform,
            profile: platform.profile(),
            output_dir: scratch.path(),
        };
        let path = self.extractor.extract(url, &request).await?;
        let file = DownloadedFile::in_scratch(path, scratch);

        let size = tokio::fs::metadata(file.path())
            .await
            .map_err(|e| Error::io(format!("failed to stat {}", file.path().display()), e))?
            .len();
        if size > self.config.max_file_bytes {
            warn!(
                %platform,
                url,
                size,
                limit = self.config.max_file_bytes,
                "fetched file exceeds upload limit"
            );
            return Err(Error::TooLarge {
                size,
                limit: self.config.max_file_bytes,
            });
        }

        info!(%platform, url, path = %file.path().display(), size, "media fetched");
        Ok(file)
    }
}
