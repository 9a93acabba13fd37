use console::{measure_text_width, Style};
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::db::{Persisted, UpsertOutcome};
use crate::error::{ParseError, PipelineError, StoreError};
use crate::extract::{ControlMessage, Post, Record};
use crate::filters::{apply_filters, Filter, FilterResult};
use crate::pipeline::{PipelineState, RunStats};

pub const TREE_BRANCH: char = '\u{251C}';
pub const TREE_END: char = '\u{2514}';
pub const TREE_HORIZ: char = '\u{2500}';

const TREE_PREFIX_WIDTH: usize = 4;
const VALUE_COLUMN: usize = 22;
const PAYLOAD_PREVIEW: usize = 512;

/// Installs the process-wide subscriber. Call once, first thing in `main`.
pub fn init_tracing() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("cashtag_crawler=info".parse()?))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        );
    set_global_default(subscriber)?;
    Ok(())
}

fn tree_branch() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_BRANCH, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

fn tree_end() -> String {
    dim()
        .apply_to(format!("{}{}{} ", TREE_END, TREE_HORIZ, TREE_HORIZ))
        .to_string()
}

pub fn dim() -> Style {
    Style::new().dim()
}

fn blue() -> Style {
    Style::new().blue()
}

fn magenta() -> Style {
    Style::new().magenta()
}

fn cyan() -> Style {
    Style::new().cyan()
}

fn green() -> Style {
    Style::new().green()
}

fn red() -> Style {
    Style::new().red()
}

fn yellow() -> Style {
    Style::new().yellow()
}

fn bold() -> Style {
    Style::new().bold()
}

fn init_prefix() -> String {
    blue().apply_to("[INIT]").to_string()
}

fn stream_prefix() -> String {
    cyan().apply_to("[STREAM]").to_string()
}

fn db_prefix() -> String {
    magenta().apply_to("[DB]").to_string()
}

pub fn pad_label(label: &str, depth: usize) -> String {
    let prefix_width = depth * TREE_PREFIX_WIDTH;
    let target_width = VALUE_COLUMN.saturating_sub(prefix_width);
    let current_width = measure_text_width(label);
    if current_width < target_width {
        format!("{}{}", label, " ".repeat(target_width - current_width))
    } else {
        format!("{} ", label)
    }
}

fn preview(payload: &str) -> String {
    if payload.chars().count() > PAYLOAD_PREVIEW {
        format!("{}...", payload.chars().take(PAYLOAD_PREVIEW - 3).collect::<String>())
    } else {
        payload.to_string()
    }
}

pub fn log_startup_config(search_term: &str, edge_source: &str, queue_url: &str, database_url: &str) {
    println!(
        "{} tracking {} (graph source {})",
        init_prefix(),
        cyan().apply_to(search_term),
        bold().apply_to(edge_source),
    );
    println!(
        "{}{} {}",
        tree_branch(),
        pad_label("store", 1),
        dim().apply_to(database_url)
    );
    println!(
        "{}{} {}",
        tree_end(),
        pad_label("queue (reserved)", 1),
        dim().apply_to(queue_url)
    );
}

pub fn log_db_ready(pool_size: u32, edge_policy: &str) {
    println!(
        "{} pool ready ({} connections, edges: {})",
        db_prefix(),
        bold().apply_to(pool_size),
        cyan().apply_to(edge_policy)
    );
}

pub fn log_stream_connected(url: &str, track: &str) {
    println!(
        "{} connected to {} for {}",
        stream_prefix(),
        dim().apply_to(url),
        cyan().apply_to(track)
    );
}

pub fn log_auth_retry(attempt: u32, delay: Duration, reason: &str) {
    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "handshake failed, retrying: {reason}");
}

pub fn log_state(state: PipelineState) {
    tracing::debug!(%state, "pipeline state");
}

pub fn log_post_persisted(post: &Post, persisted: &Persisted) {
    let marker = match persisted.post {
        UpsertOutcome::Inserted => green().apply_to("saved"),
        UpsertOutcome::DuplicateIgnored => yellow().apply_to("dup"),
    };
    println!(
        "{} {} {}",
        marker,
        dim().apply_to(format!("+{}", persisted.edges)),
        post.text
    );
}

pub fn log_post_skipped(post: &Post, filter: Filter) {
    tracing::debug!(id = %post.id, %filter, "post skipped");
}

pub fn log_control(message: &ControlMessage) {
    match message {
        ControlMessage::Limit { dropped } => {
            tracing::warn!(dropped, "rate limited upstream: {dropped} matching posts withheld");
        }
        ControlMessage::Delete { id } => {
            tracing::info!(%id, "upstream deletion notice");
        }
        ControlMessage::Disconnect { code, reason } => {
            tracing::warn!(code, %reason, "upstream requested disconnect");
        }
        ControlMessage::StallWarning {
            code,
            message,
            percent_full,
        } => {
            tracing::warn!(%code, percent_full = ?percent_full, "stall warning: {message}");
        }
    }
}

pub fn log_parse_error(err: &ParseError) {
    tracing::error!(payload = %preview(err.payload()), "record skipped: {err}");
}

pub fn log_store_error(post_id: &str, err: &StoreError) {
    tracing::error!(id = %post_id, "persist failed: {err}");
}

pub fn log_persist_panicked(post_id: &str, reason: &str) {
    tracing::error!(id = %post_id, "persist task panicked: {reason}");
}

pub fn log_stream_lost(err: &str) {
    tracing::warn!("stream session ended: {err}");
}

pub fn log_reconnect(attempt: u32, delay: Duration) {
    println!(
        "{} reconnecting (attempt {}) in {}",
        stream_prefix(),
        bold().apply_to(attempt),
        dim().apply_to(format!("{}ms", delay.as_millis()))
    );
}

pub fn log_stream_closed() {
    println!("{} upstream closed the stream", stream_prefix());
}

pub fn log_stop_requested() {
    println!("{} stop requested, draining", stream_prefix());
}

pub fn log_pool_released() {
    println!("{} connection pool is closed", db_prefix());
}

pub fn log_run_summary(stats: &RunStats) {
    println!("{} done.", stream_prefix());
    let rows = [
        ("records", stats.records),
        ("heartbeats", stats.heartbeats),
        ("inserted", stats.inserted),
        ("duplicates", stats.duplicates),
        ("edges", stats.edges),
        ("retweets", stats.retweets),
        ("empty text", stats.empty_text),
        ("limit notices", stats.limit_notices),
        ("dropped upstream", stats.dropped_upstream as usize),
        ("other notices", stats.other_notices),
        ("parse errors", stats.parse_errors),
        ("store errors", stats.store_errors),
        ("reconnects", stats.reconnects),
    ];
    let last = rows.len() - 1;
    for (i, (label, value)) in rows.iter().enumerate() {
        let branch = if i == last { tree_end() } else { tree_branch() };
        println!("{}{} {}", branch, pad_label(label, 1), dim().apply_to(value));
    }
}

pub fn log_fatal(err: &PipelineError) {
    tracing::error!("fatal: {err}");
    eprintln!("{} {}", red().apply_to("[FATAL]"), err);
}

/// Tree view of a single decoded record.
pub fn print_record(record: &Record, edge_source: Option<&str>) {
    let mut lines = vec![format!(
        "{}",
        magenta().apply_to(bold().apply_to("[RECORD]"))
    )];

    match record {
        Record::Post(post) => {
            let verdict = match apply_filters(post) {
                FilterResult::Pass => green().apply_to("persist".to_string()),
                FilterResult::Reject(f) => red().apply_to(format!("skip ({f})")),
            };
            lines.push(format!("{}{} {}", tree_branch(), pad_label("id", 1), post.id));
            lines.push(format!(
                "{}{} {}",
                tree_branch(),
                pad_label("created_at", 1),
                post.created_at.to_rfc3339()
            ));
            lines.push(format!(
                "{}{} {}",
                tree_branch(),
                pad_label("text", 1),
                dim().apply_to(&post.text)
            ));
            lines.push(format!(
                "{}{} {}",
                tree_branch(),
                pad_label("symbols", 1),
                cyan().apply_to(post.joined_symbols())
            ));
            if let Some(source) = edge_source {
                let edges: Vec<String> = crate::graph::edges(post, source)
                    .iter()
                    .map(|e| format!("{}->{}", e.source, e.target))
                    .collect();
                lines.push(format!(
                    "{}{} {}",
                    tree_branch(),
                    pad_label("edges", 1),
                    edges.join(" ")
                ));
            }
            lines.push(format!("{}{} {}", tree_end(), pad_label("verdict", 1), verdict));
        }
        Record::Control(message) => {
            lines.push(format!(
                "{}{} {:?}",
                tree_end(),
                pad_label("control", 1),
                yellow().apply_to(message)
            ));
        }
        Record::Invalid(err) => {
            lines.push(format!(
                "{}{} {}",
                tree_branch(),
                pad_label("error", 1),
                red().apply_to(err)
            ));
            lines.push(format!(
                "{}{} {}",
                tree_end(),
                pad_label("payload", 1),
                dim().apply_to(preview(err.payload()))
            ));
        }
    }

    println!("{}\n", lines.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_label_aligns_values() {
        assert_eq!(measure_text_width(&pad_label("id", 1)), VALUE_COLUMN - TREE_PREFIX_WIDTH);
        assert_eq!(pad_label("a-very-long-label-indeed", 1), "a-very-long-label-indeed ");
    }

    #[test]
    fn test_preview_truncates_long_payloads() {
        let long = "x".repeat(PAYLOAD_PREVIEW * 2);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PAYLOAD_PREVIEW);
        assert!(short.ends_with("..."));
        assert_eq!(preview("{}"), "{}");
    }
}
