//! Media pipeline: classify a link by platform, run the extraction tool into
//! the download directory, hand back a scoped local file.

pub mod cleanup;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod platform;

pub use {
    cleanup::{DownloadedFile, cleanup},
    error::{Error, Result},
    extractor::{ExtractRequest, Extractor, YtDlpExtractor},
    fetcher::{FetchConfig, MediaFetcher, PlatformFetcher},
    platform::{ExtractProfile, Platform, find_supported_link},
};
