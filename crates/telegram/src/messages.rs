//! User-facing copy, rendered as Telegram HTML.

use std::fmt::Write;

use reelbot_store::{ForcedChannel, Statistics};

/// Maximum message length allowed by Telegram.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

pub const WELCOME: &str = "\u{1f916} <b>Welcome to the YouTube &amp; Instagram downloader!</b>\n\n\
\u{1f4e5} Send a YouTube video link or an Instagram post link and the bot replies with the file.\n\n\
\u{1f6e0}\u{fe0f} <b>Commands</b>\n\
/start - show this help\n\
/admin - admin panel (admins only)\n\
/cancel - abort a pending admin prompt\n\n\
\u{26a0}\u{fe0f} Links must point directly at the post or video. Files are limited to 50 MB.";

pub const PROCESSING: &str = "\u{23f3} Processing link...";
pub const SUCCESS_CAPTION: &str = "\u{2705} Download completed";
pub const INVALID_LINK: &str =
    "\u{274c} That is not a supported link. Please send a YouTube or Instagram URL.";
pub const NOT_ADMIN: &str = "\u{274c} You do not have admin access.";
pub const CANCELLED: &str = "\u{2705} Cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

pub const ADMIN_MENU: &str = "\u{1f6e0}\u{fe0f} <b>Admin panel</b>\n\nChoose an option:";
pub const CHANNEL_PROMPT: &str = "\u{1f4dd} Send the channel as <code>@channel_username</code> \
or <code>-1001234567890</code>.\n\nSend /cancel to abort.";
pub const BROADCAST_PROMPT: &str =
    "\u{1f4e2} Send the broadcast message (text, photo or video).\n\nSend /cancel to abort.";
pub const CHANNEL_FORMAT_ERROR: &str = "\u{274c} Invalid format. Use <code>@channel_username</code> \
or <code>-1001234567890</code>.";
pub const CHANNEL_ADD_FAILED: &str = "\u{274c} Could not save the channel.";
pub const NO_CHANNELS: &str = "\u{1f4ed} No forced channels are configured.";
pub const BROADCAST_EMPTY: &str = "\u{274c} Nothing to broadcast: send text, a photo or a video.";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate to at most `max_len` bytes on a char boundary.
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn error_text(prefix: &str, detail: &str) -> String {
    // Leave room for the prefix and escaping growth.
    let detail = truncate_at_char_boundary(detail, TELEGRAM_MAX_MESSAGE_LEN / 2);
    format!("\u{274c} {prefix}{}", escape_html(detail))
}

pub fn fetch_failed(error: &dyn std::error::Error) -> String {
    error_text("", &error.to_string())
}

pub fn delivery_failed(error: &dyn std::error::Error) -> String {
    error_text("Failed to send the file: ", &error.to_string())
}

pub fn channel_unresolved(input: &str, error: &dyn std::error::Error) -> String {
    error_text(
        &format!("Could not look up {}: ", escape_html(input)),
        &error.to_string(),
    )
}

pub fn channel_added(channel_title: &str) -> String {
    format!(
        "\u{2705} Channel <b>{}</b> added.",
        escape_html(channel_title)
    )
}

fn channel_line(channel: &ForcedChannel) -> String {
    let title = escape_html(&channel.channel_title);
    match channel.link() {
        Some(link) => format!("\u{2022} <a href=\"{link}\">{title}</a>"),
        None => format!("\u{2022} {title}"),
    }
}

/// Deny message listing the channels the user still has to join.
pub fn join_required(missing: &[ForcedChannel]) -> String {
    let mut text = String::from("\u{26a0}\u{fe0f} <b>Join these channels to use the bot:</b>\n\n");
    for channel in missing {
        text.push_str(&channel_line(channel));
        text.push('\n');
    }
    text.push_str("\nAfter joining, send the link again.");
    text
}

pub fn channel_list(channels: &[ForcedChannel]) -> String {
    if channels.is_empty() {
        return NO_CHANNELS.to_string();
    }
    let mut text = String::from("\u{1f4cb} <b>Forced channels:</b>\n\n");
    for channel in channels {
        let handle = channel.channel_username.as_deref().unwrap_or("-");
        let _ = writeln!(
            text,
            "{} (<code>{}</code>, <code>{}</code>)",
            channel_line(channel),
            escape_html(handle),
            channel.channel_id
        );
    }
    text
}

pub fn statistics(stats: &Statistics, channel_count: usize, admin_ids: &[i64]) -> String {
    let admins = admin_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!(
        "\u{1f4ca} <b>Bot statistics</b>\n\n\
         \u{1f465} Users: <code>{}</code>\n\
         \u{1f4e5} Downloads: <code>{}</code>\n\
         \u{1f4cb} Forced channels: <code>{channel_count}</code>\n\
         \u{1f194} Admins: <code>{admins}</code>",
        stats.total_users, stats.total_downloads
    );
    if let Some(at) = stats.last_broadcast {
        let _ = write!(text, "\n\u{1f4e2} Last broadcast: <code>{at}</code> (unix)");
    }
    text
}

pub fn broadcast_started(recipients: usize) -> String {
    format!("\u{1f680} Starting broadcast to {recipients} users...")
}

pub fn broadcast_finished(success: usize, failure: usize) -> String {
    format!(
        "\u{1f4ca} Broadcast result:\n\n\u{2705} Delivered: {success}\n\u{274c} Failed: {failure}"
    )
}
