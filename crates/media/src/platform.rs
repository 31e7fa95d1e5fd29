use std::fmt;

/// Source platforms the bot can download from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Instagram,
}

/// Domain substrings in match order. The first hit decides the platform.
const PLATFORM_DOMAINS: [(&str, Platform); 3] = [
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("instagram.com", Platform::Instagram),
];

/// Extraction settings applied for a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProfile {
    /// `yt-dlp` format selector, `None` for the tool default.
    pub format: Option<&'static str>,
}

impl Platform {
    /// Classify a link by substring match against the known domains.
    pub fn classify(url: &str) -> Option<Self> {
        PLATFORM_DOMAINS
            .iter()
            .find(|(domain, _)| url.contains(domain))
            .map(|(_, platform)| *platform)
    }

    pub fn profile(self) -> ExtractProfile {
        match self {
            // Cap video height at 720p to stay under the upload limit.
            Self::YouTube => ExtractProfile {
                format: Some("best[height<=720]"),
            },
            Self::Instagram => ExtractProfile { format: None },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Instagram => "Instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First whitespace-separated token of `text` that classifies, so a link
/// pasted with surrounding words reaches the extractor on its own.
pub fn find_supported_link(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|token| Platform::classify(token).is_some())
}
