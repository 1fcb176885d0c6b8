pub mod config;
pub mod pipeline;

pub use pipeline::report::{
    build_client, combine_messages, export_report, is_report_trigger, load_report_json,
    parse_report_response, parse_slack_export, to_markdown, to_slack_text, ErrorKind,
    ExportFormat, ExtractionError, GeneratedReport, IncidentReport, LlmClient, MockLlmClient,
    ParseError, ProviderError, ReportGenerator, RetryPolicy,
};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Logs go to stderr so stdout stays
/// clean for the rendered report.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` picks the level.
pub fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(level.as_deref()))),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
