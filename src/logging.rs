//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestration core and its
//! binaries. Human-readable output by default, JSON lines when
//! `DILIGENCE_LOG_FORMAT=json`.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; a subscriber installed elsewhere (for example
/// by a test harness) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));
        let json = std::env::var("DILIGENCE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = output_layer(
            json,
            std::io::stderr,
            std::io::stderr().is_terminal(),
            filter,
        );

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
            return;
        }

        tracing::info!(
            environment = %environment,
            format = if json { "json" } else { "text" },
            "Structured logging initialized"
        );
    });
}

/// Text or JSON formatting layer; both formats write to `writer`
fn output_layer<S, W>(
    json: bool,
    writer: W,
    ansi: bool,
    filter: EnvFilter,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

fn get_environment() -> String {
    std::env::var("DILIGENCE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}
