//! Terminal output: message lines and progress spinners.

use chrono::{Local, TimeZone};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use shellchat_store::Message;
use std::time::Duration;

/// Spinner shown while something slow runs (key derivation, dials)
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    /// Start a spinner with `msg`
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(msg.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Finish with success message
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.bar.finish_with_message(msg.into());
    }

    /// Remove the spinner without a message (for errors)
    pub fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a Unix timestamp in local time
#[must_use]
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// Last 8 characters of a peer id string, for display
#[must_use]
pub fn short_peer(peer_id: &str) -> &str {
    let start = peer_id
        .char_indices()
        .rev()
        .nth(7)
        .map_or(0, |(i, _)| i);
    &peer_id[start..]
}

/// One stored message as a line of text
#[must_use]
pub fn format_message(message: &Message) -> String {
    let who = if message.is_sent {
        style("me".to_string()).green().bold()
    } else {
        style(short_peer(&message.peer_id).to_string()).cyan().bold()
    };
    let content = if message.decryption_failed() {
        style(message.content.clone()).red()
    } else {
        style(message.content.clone())
    };

    format!(
        "{} {who}: {content}",
        style(format!("[{}]", format_timestamp(message.timestamp))).dim()
    )
}

/// A message that just arrived from `peer_id`
#[must_use]
pub fn format_incoming(peer_id: &str, text: &str) -> String {
    format!("{}: {text}", style(short_peer(peer_id).to_string()).cyan().bold())
}

/// A status line from the client itself
#[must_use]
pub fn format_notice(text: &str) -> String {
    style(format!("* {text}")).yellow().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    #[test]
    fn test_short_peer() {
        assert_eq!(
            short_peer("12D3KooWGzEyQFp5r1yT7hRqgyjGBxW6b4Tj2pX3Xp4F5yH9aZcQ"),
            "5yH9aZcQ"
        );
        assert_eq!(short_peer("abc"), "abc");
        assert_eq!(short_peer(""), "");
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1_700_000_000);
        assert_eq!(formatted.len(), "2023-11-14 22:13:20".len());
        assert!(formatted.starts_with("2023-11-1"));
    }

    #[test]
    fn test_format_message() {
        let sent = Message {
            id: 1,
            peer_id: "12D3KooWpeerAAAABBBB".to_string(),
            content: "hello".to_string(),
            timestamp: 1_700_000_000,
            is_sent: true,
        };
        assert!(plain(&format_message(&sent)).ends_with("me: hello"));

        let received = Message {
            is_sent: false,
            content: "hi back".to_string(),
            ..sent
        };
        assert!(plain(&format_message(&received)).ends_with("AAAABBBB: hi back"));
    }

    #[test]
    fn test_format_incoming_and_notice() {
        assert_eq!(plain(&format_incoming("xxxxPEER1234", "yo")), "PEER1234: yo");
        assert_eq!(plain(&format_notice("connected")), "* connected");
    }
}
