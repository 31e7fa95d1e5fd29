//! Adapter over the `yt-dlp` command-line extractor.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    platform::{ExtractProfile, Platform},
};

/// One extraction job: which platform handler runs, with which settings,
/// into which directory.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub platform: Platform,
    pub profile: ExtractProfile,
    pub output_dir: &'a Path,
}

/// Turns a URL into a local media file.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Download `url` and return the path of the written file. Every failure
    /// comes back as [`Error::Extraction`].
    async fn extract(&self, url: &str, request: &ExtractRequest<'_>) -> Result<PathBuf>;
}

/// Runs `yt-dlp` as a child process.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, url: &str, request: &ExtractRequest<'_>) -> Command {
        let template = request.output_dir.join("%(title)s.%(ext)s");
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--quiet",
            "--no-warnings",
            "--no-progress",
            "--no-playlist",
            "--no-simulate",
            "--print",
            "after_move:filepath",
        ])
        .arg("-o")
        .arg(&template);
        if let Some(format) = request.profile.format {
            cmd.arg("-f").arg(format);
        }
        cmd.arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new("yt-dlp", Duration::from_secs(600))
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(&self, url: &str, request: &ExtractRequest<'_>) -> Result<PathBuf> {
        let platform = request.platform;
        debug!(%platform, url, binary = %self.binary.display(), "running extractor");

        let output = match tokio::time::timeout(self.timeout, self.command(url, request).output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::extraction(
                    platform,
                    format!("failed to run {}: {e}", self.binary.display()),
                ));
            },
            Err(_) => {
                warn!(%platform, url, timeout_secs = self.timeout.as_secs(), "extractor timed out");
                return Err(Error::extraction(
                    platform,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ));
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_error_line(&stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("extractor exited with {}", output.status));
            return Err(Error::extraction(platform, message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| Error::extraction(platform, "extractor reported no output file"))?;

        if !path.is_file() {
            return Err(Error::extraction(
                platform,
                format!("output file {} is missing", path.display()),
            ));
        }
        Ok(path)
    }
}

/// Pick the most useful line of the tool's stderr: the last `ERROR:` line,
/// else the last non-empty one.
fn last_error_line(stderr: &str) -> Option<&str> {
    let lines = || stderr.lines().map(str::trim).filter(|line| !line.is_empty());
    lines()
        .filter_map(|line| line.strip_prefix("ERROR:"))
        .next_back()
        .map(str::trim)
        .or_else(|| lines().next_back())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_line_prefers_error_prefix() {
        let stderr = "WARNING: something odd\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            last_error_line(stderr),
            Some("[youtube] abc: Video unavailable")
        );
        assert_eq!(last_error_line("just noise\n"), Some("just noise"));
        assert_eq!(last_error_line("\n  \n"), None);
    }

    #[test]
    fn command_applies_profile_and_template() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = YtDlpExtractor::default();
        let request = ExtractRequest {
            platform: Platform::YouTube,
            profile: Platform::YouTube.profile(),
            output_dir: dir.path(),
        };
        let cmd = extractor.command("https://youtu.be/x", &request);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "best[height<=720]"));
        assert!(args.iter().any(|a| a.ends_with("%(title)s.%(ext)s")));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
        assert_eq!(args[args.len() - 2], "--");

        let request = ExtractRequest {
            platform: Platform::Instagram,
            profile: Platform::Instagram.profile(),
            output_dir: dir.path(),
        };
        let cmd = extractor.command("https://instagram.com/p/x", &request);
        assert!(!cmd.as_std().get_args().any(|a| a == "-f"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp", Duration::from_secs(5));
        let request = ExtractRequest {
            platform: Platform::Instagram,
            profile: Platform::Instagram.profile(),
            output_dir: dir.path(),
        };
        let err = extractor
            .extract("https://instagram.com/p/x", &request)
            .await
            .unwrap_err();
        match err {
            Error::Extraction { platform, message } => {
                assert_eq!(platform, Platform::Instagram);
                assert!(message.contains("failed to run"), "{message}");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    mod fake_tool {
        use {super::*, std::os::unix::fs::PermissionsExt};

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn request(dir: &Path) -> ExtractRequest<'_> {
            ExtractRequest {
                platform: Platform::YouTube,
                profile: Platform::YouTube.profile(),
                output_dir: dir,
            }
        }

        #[tokio::test]
        async fn reports_printed_output_path() {
            let tools = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let target = out.path().join("My Clip.mp4");
            let bin = script(
                tools.path(),
                &format!("printf 'data' > '{0}'\necho '{0}'", target.display()),
            );

            let extractor = YtDlpExtractor::new(bin, Duration::from_secs(10));
            let path = extractor
                .extract("https://youtu.be/x", &request(out.path()))
                .await
                .unwrap();
            assert_eq!(path, target);
        }

        #[tokio::test]
        async fn non_zero_exit_carries_tool_error() {
            let tools = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let bin = script(
                tools.path(),
                "echo 'ERROR: [youtube] x: Video unavailable' >&2\nexit 1",
            );

            let extractor = YtDlpExtractor::new(bin, Duration::from_secs(10));
            let err = extractor
                .extract("https://youtu.be/x", &request(out.path()))
                .await
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "download from YouTube failed: [youtube] x: Video unavailable"
            );
        }

        #[tokio::test]
        async fn silent_success_without_file_is_an_error() {
            let tools = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let bin = script(tools.path(), "exit 0");

            let extractor = YtDlpExtractor::new(bin, Duration::from_secs(10));
            let err = extractor
                .extract("https://youtu.be/x", &request(out.path()))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("no output file"), "{err}");
        }

        #[tokio::test]
        async fn slow_tool_times_out() {
            let tools = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let bin = script(tools.path(), "sleep 5");

            let extractor = YtDlpExtractor::new(bin, Duration::from_millis(200));
            let err = extractor
                .extract("https://youtu.be/x", &request(out.path()))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("timed out"), "{err}");
        }
    }
}
