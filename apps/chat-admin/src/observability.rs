use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_FILTER: &str = "info";

static INVOCATION_ID: OnceLock<String> = OnceLock::new();

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

// CHAT_LOG_LEVEL wins over RUST_LOG
fn filter_directives(chat_level: Option<String>, rust_log: Option<String>) -> String {
    chat_level
        .or(rust_log)
        .filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init_tracing(format: LogFormat) {
    let directives = filter_directives(
        std::env::var("CHAT_LOG_LEVEL").ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives));

    let installed = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    };
    if installed.is_err() {
        return;
    }

    tracing::debug!(
        component = "bootstrap",
        version = env!("CARGO_PKG_VERSION"),
        ?format,
        "logging initialized"
    );
}

/// Identifies every log line of one chat-admin run.
pub fn invocation_id() -> &'static str {
    INVOCATION_ID.get_or_init(|| Uuid::new_v4().to_string())
}

/// Span wrapping a single admin command; store events logged while it runs
/// carry the command name and invocation id.
pub fn command_span(command: &'static str) -> Span {
    tracing::info_span!("command", name = command, invocation_id = %invocation_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_log_level_takes_precedence() {
        assert_eq!(
            filter_directives(Some("debug".into()), Some("warn".into())),
            "debug"
        );
        assert_eq!(filter_directives(None, Some("warn".into())), "warn");
        assert_eq!(filter_directives(None, None), "info");
        assert_eq!(filter_directives(Some("  ".into()), None), "info");
    }

    #[test]
    fn log_format_parses_from_flag_values() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("TEXT", true), Ok(LogFormat::Text));
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn invocation_id_is_stable_within_a_run() {
        let first = invocation_id();
        assert_eq!(first, invocation_id());
        assert!(Uuid::parse_str(first).is_ok());
    }
}
