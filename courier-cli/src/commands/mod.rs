//! CLI command implementations.

pub mod config;
pub mod fetch;
pub mod trigger;
pub mod watch;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use courier_api::HttpFetcher;
use courier_core::config::AppConfig;
use courier_core::error::CourierResult;
use courier_models::Message;

/// Helper to create the backend fetcher from config.
pub fn create_fetcher(config: &AppConfig) -> CourierResult<HttpFetcher> {
    HttpFetcher::new(&config.backend)
}

/// Truncate a string to at most `max_len` characters, appending an
/// ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{head}...")
}

/// What a message shows in a single line: its text, or its media.
pub fn message_body(message: &Message) -> String {
    match (&message.text, &message.media_type) {
        (Some(text), _) if !text.is_empty() => text.replace('\n', " "),
        (_, Some(kind)) => format!("[{kind}]"),
        _ if message.has_media() => "[media]".to_string(),
        _ => "[no text]".to_string(),
    }
}

pub fn print_message_line(message: &Message, edited: bool) {
    let author = if message.author_name.is_empty() {
        message.author_id.as_str()
    } else {
        message.author_name.as_str()
    };
    let marker = if edited { style(" (edited)").yellow().to_string() } else { String::new() };
    println!(
        "  {} {}: {}{}",
        style(message.sent_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(author).bold(),
        message_body(message),
        marker
    );
}

pub fn messages_table(messages: &[Message]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Sent", "Author", "Thread", "Text"]);

    for message in messages {
        table.add_row(vec![
            message.id.clone(),
            message.sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            truncate(&message.author_name, 20),
            message.thread_id.clone().unwrap_or_else(|| "-".into()),
            truncate(&message_body(message), 60),
        ]);
    }
    table
}
