use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::parser::parse_report_response;
use super::render::to_markdown;
use super::types::{IncidentReport, Omissions, ParsedReport};
use super::ParseError;

/// File name timestamp, e.g. `incident_report_20240315_142301.md`.
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot write report to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read report from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("saved report is invalid: {0}")]
    Invalid(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected 'markdown' or 'json')")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markdown => f.write_str("markdown"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Serialize a report in the requested format.
pub fn render_export(
    report: &IncidentReport,
    omissions: &Omissions,
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Markdown => Ok(to_markdown(report, omissions)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Write a report to `dir/incident_report_<timestamp>.<ext>`, creating `dir`
/// if needed. An existing file is never overwritten; a numeric suffix is added.
pub fn export_report(
    dir: &Path,
    report: &IncidentReport,
    omissions: &Omissions,
    format: ExportFormat,
    now: NaiveDateTime,
) -> Result<PathBuf, ExportError> {
    let content = render_export(report, omissions, format)?;

    std::fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let stem = format!("incident_report_{}", now.format(FILE_TIMESTAMP_FORMAT));
    let ext = format.extension();
    let (path, mut file) = create_unique(dir, &stem, ext)?;

    file.write_all(content.as_bytes())
        .map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

    tracing::info!(path = %path.display(), format = %format, "Report saved");
    Ok(path)
}

/// Atomically claim `stem.ext`, then `stem_2.ext`, `stem_3.ext`, ...
fn create_unique(dir: &Path, stem: &str, ext: &str) -> Result<(PathBuf, File), ExportError> {
    let mut suffix = 1u32;
    loop {
        let name = match suffix {
            1 => format!("{stem}.{ext}"),
            n => format!("{stem}_{n}.{ext}"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(source) => return Err(ExportError::Write { path, source }),
        }
    }
}

/// Load a JSON export, validating it exactly like a model response.
pub fn load_report_json(path: &Path) -> Result<ParsedReport, ExportError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_report_response(&raw)?)
}
