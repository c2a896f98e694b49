//! MarkdownV2 rendering of turn reports, info cards and notices.
//!
//! Telegram rejects a MarkdownV2 message if any reserved character is left
//! unescaped, so every dynamic fragment goes through [`escape_markdown_v2`].
//! Static decoration is escaped too; only the bold markers around the model
//! name are intentional markup.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use relay_engine::TurnReport;
use relay_types::ModelInfo;

use crate::api::InlineButton;

/// Characters reserved by MarkdownV2 outside code entities.
const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Callback data prefix for model picker buttons.
pub const MODEL_CALLBACK_PREFIX: &str = "model:";

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const STATS_RULE: &str = "━━━━━━━━━━━━━━━━━";

/// Static facts shown on the info card.
#[derive(Debug, Clone)]
pub struct InfoCard<'a> {
    pub started_at: SystemTime,
    pub version: &'a str,
    pub model: &'a str,
    pub endpoint: &'a str,
    pub history_length: u32,
    pub window: Duration,
}

/// Backslash-escape every MarkdownV2 reserved character.
///
/// ```
/// use relay_telegram::format::escape_markdown_v2;
///
/// assert_eq!(escape_markdown_v2("v1.2 (beta)!"), r"v1\.2 \(beta\)\!");
/// ```
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Full MarkdownV2 message for a turn: reply or error, then the stats block.
pub fn render_turn(report: &TurnReport) -> String {
    match &report.outcome {
        Ok(outcome) => {
            let source = outcome.usage.source.label();
            let stats = format!(
                "\n\n━━━━━━ Stats ━━━━━━\n\
                 📊 Input: {} ({source})    Total input: {}\n\
                 📈 Output: {} ({source})    Total output: {}\n\
                 ⏱ Elapsed: {:.2}s\n\
                 🔄 Rounds left: {}\n\
                 🕒 Window left: {}\n\
                 🤖 Model: {}\n\
                 {STATS_RULE}",
                outcome.usage.input,
                report.totals.total_input_tokens,
                outcome.usage.output,
                report.totals.total_output_tokens,
                report.elapsed.as_secs_f64(),
                report.remaining_rounds,
                minutes_seconds(report.remaining_window),
                report.model,
            );
            format!(
                "🤖 *{}*\n{}{}",
                escape_markdown_v2(&report.model),
                escape_markdown_v2(&outcome.reply),
                escape_markdown_v2(&stats)
            )
        }
        Err(exhausted) => render_error(&exhausted.to_string()),
    }
}

/// Unformatted fallback used when the MarkdownV2 send is rejected.
pub fn render_turn_plain(report: &TurnReport) -> String {
    match &report.outcome {
        Ok(outcome) => format!(
            "Formatting failed, here is the unformatted reply:\n\n{}",
            outcome.reply
        ),
        Err(exhausted) => format!("Sorry, something went wrong: {exhausted}"),
    }
}

pub fn render_error(error: &str) -> String {
    escape_markdown_v2(&format!(
        "Sorry, something went wrong: {error}\nCheck the logs for details."
    ))
}

pub fn render_info_card(card: &InfoCard<'_>) -> String {
    let started: DateTime<Local> = card.started_at.into();
    let text = format!(
        "🤖 Bot info 🤖\n\
         ──────────────\n\
         📅  Started: {}\n\
         🔢  Version: {}\n\
         ⚙️  Model: {}\n\
         🌐  API URL: {}\n\
         🔄  Round limit: {}\n\
         ⏲️  Memory window: {} minutes\n\
         ──────────────",
        started.format("%Y-%m-%d %H:%M:%S"),
        card.version,
        if card.model.is_empty() { "(none)" } else { card.model },
        card.endpoint,
        card.history_length,
        card.window.as_secs() / 60,
    );
    escape_markdown_v2(&text)
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Breaks prefer a blank line, then a newline, then a sentence end, then a
/// space; a run without any of those is cut hard at the limit.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map_or(remaining.len(), |(index, _)| index);
        let window = &remaining[..limit];
        let split = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(". ").map(|index| index + 1))
            .or_else(|| window.rfind(' '))
            .filter(|&index| index > 0)
            .unwrap_or(limit);

        chunks.push(window[..split].to_string());
        remaining = remaining[split..].trim_start();
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Two buttons per row, callback data `model:<id>`.
pub fn model_keyboard(models: &[ModelInfo]) -> Vec<Vec<InlineButton>> {
    models
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|model| {
                    InlineButton::new(&model.id, format!("{MODEL_CALLBACK_PREFIX}{}", model.id))
                })
                .collect()
        })
        .collect()
}

fn minutes_seconds(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
