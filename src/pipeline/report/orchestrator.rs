use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::client::{build_client, GenerationOptions};
use super::parser::parse_report_response;
use super::prompt::{build_prompt, build_repair_prompt, SYSTEM_PROMPT};
use super::sanitize::{sanitize_incident_text, validate_input, DEFAULT_MAX_INPUT_CHARS};
use super::types::{GeneratedReport, LlmClient, Omissions, ParsedReport};
use super::{ExtractionError, ProviderError};
use crate::config::Config;
use crate::pipeline::diagnostic;

/// Hard cap on model round-trips per report, shared by the transient retry
/// and the repair prompt.
pub const MAX_MODEL_CALLS: u32 = 2;

/// Which second-chance calls the pipeline may spend its budget on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry once after a transient `ProviderError` (timeout, rate limit, 5xx).
    pub retry_transient: bool,
    /// Send one stricter follow-up prompt when the response does not parse.
    pub repair_on_parse_failure: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_transient: true,
            repair_on_parse_failure: false,
        }
    }
}

/// Orchestrates the extraction pipeline:
/// validate → sanitize → prompt → model → parse → result
///
/// Holds no per-call state, so one generator can serve concurrent callers.
pub struct ReportGenerator {
    llm: Box<dyn LlmClient + Send + Sync>,
    options: GenerationOptions,
    policy: RetryPolicy,
    max_input_chars: usize,
    dump_dir: Option<PathBuf>,
}

impl ReportGenerator {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, options: GenerationOptions) -> Self {
        Self {
            llm,
            options,
            policy: RetryPolicy::default(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            dump_dir: None,
        }
    }

    /// Build the provider adapter and generator described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ExtractionError> {
        Ok(Self::new(build_client(config)?, config.generation.clone())
            .with_policy(config.retry_policy)
            .with_max_input_chars(config.max_input_chars)
            .with_dump_dir(config.dump_dir.clone()))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Base directory for per-run diagnostic artifacts; `None` disables the dump.
    pub fn with_dump_dir(mut self, dump_dir: Option<PathBuf>) -> Self {
        self.dump_dir = dump_dir;
        self
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Turn free-form incident notes into a validated report.
    ///
    /// Makes at most [`MAX_MODEL_CALLS`] model calls. Input errors are returned
    /// before any network traffic.
    pub fn generate_report(&self, raw_text: &str) -> Result<GeneratedReport, ExtractionError> {
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "generate_report",
            run_id = %run_id,
            model = %self.options.model,
            input_chars = raw_text.chars().count()
        )
        .entered();

        let dump_dir = self
            .dump_dir
            .as_deref()
            .and_then(|base| diagnostic::dump_dir_in(base, &run_id));
        let result = self.run(run_id, raw_text, dump_dir.as_deref());

        match &result {
            Ok(generated) => {
                tracing::info!(
                    model_calls = generated.model_calls,
                    timeline_events = generated.report.timeline.len(),
                    action_items = generated.report.action_items.len(),
                    omitted = generated.omissions.total(),
                    "Incident report generated"
                );
                if let Some(dir) = dump_dir.as_deref() {
                    diagnostic::dump_json(dir, "03-result.json", generated);
                }
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), error = %e, "Incident report generation failed");
                if let Some(dir) = dump_dir.as_deref() {
                    diagnostic::dump_text(dir, "03-error.txt", &format!("{e}\n"));
                }
            }
        }

        result
    }

    fn run(
        &self,
        run_id: Uuid,
        raw_text: &str,
        dump_dir: Option<&Path>,
    ) -> Result<GeneratedReport, ExtractionError> {
        validate_input(raw_text, self.max_input_chars)?;

        let sanitized = sanitize_incident_text(raw_text);
        if sanitized.trim().is_empty() {
            return Err(ExtractionError::Input(
                "incident notes contain no readable text".into(),
            ));
        }

        let prompt = build_prompt(&sanitized);
        if let Some(dir) = dump_dir {
            diagnostic::dump_text(dir, "01-prompt.txt", &prompt);
        }

        let mut calls = 0u32;
        let mut warnings = Vec::new();

        let response = self.call_with_retry(&prompt, &mut calls, dump_dir)?;
        let (parsed, raw_response) = match parse_report_response(&response) {
            Ok(parsed) => (parsed, response),
            Err(e) if self.policy.repair_on_parse_failure && calls < MAX_MODEL_CALLS => {
                tracing::warn!(
                    attempt = calls,
                    error = %e,
                    "Model response unusable, sending repair prompt"
                );
                let repair_prompt = build_repair_prompt(&sanitized, &e.excerpt, &e.reason());
                let second = self.call_model(&repair_prompt, &mut calls, dump_dir)?;
                let parsed = parse_report_response(&second)?;
                warnings.push(format!(
                    "First model response was unusable ({}); report taken from the repair attempt",
                    e.reason()
                ));
                (parsed, second)
            }
            Err(e) => return Err(e.into()),
        };

        let ParsedReport {
            report,
            omissions,
            normalized,
        } = parsed;

        if normalized {
            warnings.push(
                "Model output needed quote or trailing-comma normalization before decoding".into(),
            );
        }
        warnings.extend(omission_warnings(&omissions));
        for warning in &warnings {
            tracing::warn!(warning = %warning, "Report generated with warnings");
        }

        Ok(GeneratedReport {
            run_id,
            report,
            omissions,
            model_calls: calls,
            model: self.options.model.clone(),
            warnings,
            raw_response,
        })
    }

    /// One call, plus one retry when the failure is transient and budget remains.
    fn call_with_retry(
        &self,
        prompt: &str,
        calls: &mut u32,
        dump_dir: Option<&Path>,
    ) -> Result<String, ProviderError> {
        loop {
            match self.call_model(prompt, calls, dump_dir) {
                Ok(response) => return Ok(response),
                Err(e)
                    if self.policy.retry_transient
                        && e.is_transient()
                        && *calls < MAX_MODEL_CALLS =>
                {
                    tracing::warn!(attempt = *calls, error = %e, "Model call failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn call_model(
        &self,
        prompt: &str,
        calls: &mut u32,
        dump_dir: Option<&Path>,
    ) -> Result<String, ProviderError> {
        *calls += 1;
        tracing::debug!(attempt = *calls, prompt_chars = prompt.len(), "Calling model");

        let response = self.llm.complete(SYSTEM_PROMPT, prompt, &self.options)?;
        if let Some(dir) = dump_dir {
            diagnostic::dump_text(dir, &format!("02-response-{calls}.txt"), &response);
        }
        Ok(response)
    }
}

fn omission_warnings(omissions: &Omissions) -> Vec<String> {
    [
        (omissions.timeline_events, "timeline event"),
        (omissions.action_items, "action item"),
        (omissions.affected_systems, "affected system"),
        (omissions.related_incidents, "related incident"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, what)| {
        let plural = if count == 1 { "" } else { "s" };
        format!("{count} malformed {what}{plural} dropped from the model output")
    })
    .collect()
}
