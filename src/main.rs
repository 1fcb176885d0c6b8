//! Incident Copilot command-line tool.
//!
//! `generate` turns notes from a file, a Slack export or stdin into a report;
//! `render` re-renders a saved JSON report without calling a model.
//! Exit codes: 0 ok, 2 input, 3 configuration, 4 provider, 5 parse, 1 anything else.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use incident_copilot_lib::config::{self, Config};
use incident_copilot_lib::pipeline::report::{
    combine_messages, export_report, load_report_json, parse_slack_export, render_export,
    to_markdown, to_slack_text, ErrorKind, ExportError, ExportFormat, ExtractionError,
    ReportGenerator,
};

#[derive(Parser, Debug)]
#[command(name = "incident-copilot")]
#[command(about = "Turn raw incident notes into a structured incident report")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a report from incident notes (FILE, --slack-export, or stdin)
    Generate(GenerateArgs),
    /// Render a previously saved JSON report
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// File with incident notes; stdin is read when omitted
    #[arg(conflicts_with = "slack_export")]
    file: Option<PathBuf>,

    /// Slack channel export (JSON) to use as the notes
    #[arg(long)]
    slack_export: Option<PathBuf>,

    /// Output format printed to stdout
    #[arg(long, value_enum, default_value_t = GenerateFormat::Markdown)]
    format: GenerateFormat,

    /// Also save the report under the output directory
    #[arg(long)]
    save: bool,

    /// Output directory for --save (overrides OUTPUT_DIR)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Model name (overrides MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature, 0.0 to 1.0 (overrides TEMPERATURE)
    #[arg(long)]
    temperature: Option<f32>,

    /// Output token budget (overrides MAX_TOKENS)
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Send one follow-up prompt when the model answer is not valid JSON
    #[arg(long)]
    repair: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON report written by `generate --format json --save`
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = RenderFormat::Markdown)]
    format: RenderFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GenerateFormat {
    Markdown,
    Json,
}

impl From<GenerateFormat> for ExportFormat {
    fn from(format: GenerateFormat) -> Self {
        match format {
            GenerateFormat::Markdown => ExportFormat::Markdown,
            GenerateFormat::Json => ExportFormat::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RenderFormat {
    Markdown,
    Slack,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    incident_copilot_lib::init_tracing();

    let cli = Cli::parse();
    tracing::debug!("{} v{} starting", config::APP_NAME, config::APP_VERSION);

    let result = match cli.command {
        Command::Generate(args) => generate(args),
        Command::Render(args) => render(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ExtractionError>() {
                Some(ExtractionError::Parse(parse)) => {
                    eprintln!("Error: {}", ExtractionError::Parse(parse.clone()).user_message());
                    eprintln!("Model output began with:\n{}", parse.excerpt);
                }
                Some(extraction) => eprintln!("Error: {}", extraction.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<ExtractionError>().map(ExtractionError::kind) {
        Some(ErrorKind::Input) => 2,
        Some(ErrorKind::Config) => 3,
        Some(ErrorKind::Provider) => 4,
        Some(ErrorKind::Parse) => 5,
        None => 1,
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(model) = args.model.as_deref() {
        config = config.with_model(model)?;
    }
    if let Some(temperature) = args.temperature {
        config = config.with_temperature(temperature)?;
    }
    if let Some(max_tokens) = args.max_tokens {
        config = config.with_max_tokens(max_tokens)?;
    }
    if args.repair {
        config.retry_policy.repair_on_parse_failure = true;
    }
    tracing::debug!(?config, "Configuration loaded");

    let notes = read_notes(args.file.as_deref(), args.slack_export.as_deref())?;
    let generator = ReportGenerator::from_config(&config)?;
    let generated = generator.generate_report(&notes)?;

    for warning in &generated.warnings {
        eprintln!("warning: {warning}");
    }

    let format = ExportFormat::from(args.format);
    println!(
        "{}",
        render_export(&generated.report, &generated.omissions, format)?
    );

    if args.save {
        let dir = args.out_dir.unwrap_or_else(|| config.output_dir.clone());
        let path = export_report(
            &dir,
            &generated.report,
            &generated.omissions,
            format,
            chrono::Local::now().naive_local(),
        )?;
        eprintln!("Report saved to {}", path.display());
    }

    Ok(())
}

fn render(args: RenderArgs) -> Result<()> {
    let parsed = load_report_json(&args.file).map_err(|e| match e {
        ExportError::Invalid(parse) => anyhow::Error::from(ExtractionError::Parse(parse)),
        read @ ExportError::Read { .. } => ExtractionError::Input(read.to_string()).into(),
        other => other.into(),
    })?;

    let text = match args.format {
        RenderFormat::Markdown => to_markdown(&parsed.report, &parsed.omissions),
        RenderFormat::Slack => to_slack_text(&parsed.report, &parsed.omissions),
    };
    println!("{text}");
    Ok(())
}

fn read_notes(file: Option<&Path>, slack_export: Option<&Path>) -> Result<String> {
    if let Some(path) = slack_export {
        let json = read_file(path)?;
        let messages = parse_slack_export(&json)?;
        tracing::info!(messages = messages.len(), "Slack export loaded");
        return Ok(combine_messages(&messages));
    }

    if let Some(path) = file {
        return Ok(read_file(path)?);
    }

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Paste incident notes, then press Ctrl-D:");
    }
    let mut notes = String::new();
    stdin
        .read_to_string(&mut notes)
        .map_err(|e| ExtractionError::Input(format!("cannot read stdin: {e}")))?;
    Ok(notes)
}

fn read_file(path: &Path) -> Result<String, ExtractionError> {
    std::fs::read_to_string(path)
        .map_err(|e| ExtractionError::Input(format!("cannot read {}: {e}", path.display())))
}
