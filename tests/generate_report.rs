use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;

use chrono::NaiveDate;
use incident_copilot_lib::config::Config;
use incident_copilot_lib::pipeline::report::{GenerationOptions, Provider};
use incident_copilot_lib::{
    combine_messages, export_report, load_report_json, parse_slack_export, to_markdown,
    ErrorKind, ExportFormat, MockLlmClient, ProviderError, ReportGenerator,
};

const MODEL_ANSWER: &str = r#"Here is the report you asked for:
```json
{
  "incident_id": "INC-9001",
  "title": "Primary database failover",
  "executive_summary": "The primary Postgres node lost its disk and traffic failed over after 12 minutes.",
  "affected_systems": ["orders-db", "orders-api"],
  "timeline": [
    {"timestamp": "02:14", "event_description": "Disk I/O errors on db-1", "severity": "high"},
    {"timestamp": "02:20", "description": "Orders API returning 503", "severity": "critical"},
    {"timestamp": "02:26", "description": "Failover to db-2 completed", "severity": "info"},
    "garbage entry"
  ],
  "root_cause_hypothesis": "Hardware failure of the primary data volume.",
  "impact_assessment": "Order placement unavailable for 12 minutes.",
  "resolution_summary": "Automatic failover promoted the replica.",
  "action_items": [
    {"task": "Replace failed volume", "priority": "high", "assigned_to": "dba-team"},
    {"description": "Tune failover detection to under 2 minutes", "priority": "medium"}
  ]
}
```"#;

fn generator(mock: &Arc<MockLlmClient>) -> ReportGenerator {
    ReportGenerator::new(
        Box::new(Arc::clone(mock)),
        GenerationOptions::for_provider(Provider::Anthropic),
    )
}

#[test]
fn notes_to_markdown_and_saved_json() {
    let mock = Arc::new(MockLlmClient::new(MODEL_ANSWER));
    let generated = generator(&mock)
        .generate_report("02:14 db-1 disk errors\n02:20 orders 503\n02:26 failover done")
        .unwrap();

    let report = &generated.report;
    assert_eq!(report.title, "Primary database failover");
    assert_eq!(report.timeline.len(), 3);
    assert_eq!(report.timeline[0].description, "Disk I/O errors on db-1");
    assert_eq!(report.action_items[0].assignee.as_deref(), Some("dba-team"));
    assert_eq!(generated.omissions.timeline_events, 1);
    assert_eq!(generated.model_calls, 1);

    let md = to_markdown(report, &generated.omissions);
    assert!(md.contains("**02:20** - Orders API returning 503 [critical]"));
    assert!(md.contains("1. **[high]** Replace failed volume (Assigned: dba-team)"));
    assert!(md.contains("1 malformed entry omitted"));

    let dir = tempfile::tempdir().unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    let path = export_report(
        dir.path(),
        report,
        &generated.omissions,
        ExportFormat::Json,
        now,
    )
    .unwrap();
    assert!(path.ends_with("incident_report_20240102_030405.json"));

    let loaded = load_report_json(&path).unwrap();
    assert_eq!(&loaded.report, report);
}

#[test]
fn slack_export_becomes_chronological_notes() {
    let export = r#"{"messages":[
        {"user":"U2","text":"failover done, orders recovering","ts":"1700000600.0"},
        {"subtype":"channel_join","ts":"1700000500.0"},
        {"user":"U1","text":"db-1 throwing disk errors","ts":"1700000000.0"}
    ]}"#;
    let notes = combine_messages(&parse_slack_export(export).unwrap());
    assert_eq!(
        notes,
        "db-1 throwing disk errors\nfailover done, orders recovering"
    );

    let mock = Arc::new(MockLlmClient::new(MODEL_ANSWER));
    generator(&mock).generate_report(&notes).unwrap();
    let prompt = &mock.prompts()[0];
    let first = prompt.find("db-1 throwing disk errors").unwrap();
    let second = prompt.find("failover done").unwrap();
    assert!(first < second);
}

#[test]
fn error_kinds_reach_the_caller() {
    let mock = Arc::new(MockLlmClient::failing(ProviderError::Timeout(60)));
    let err = generator(&mock).generate_report("api down").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Provider);
    assert_eq!(mock.call_count(), 2);

    let mock = Arc::new(MockLlmClient::new("I could not find an incident here."));
    let err = generator(&mock).generate_report("api down").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);

    let err = generator(&mock).generate_report("  ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
}

/// Answer one HTTP request with `body`, returning the base URL.
fn serve_once(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                break;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).unwrap();

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{addr}")
}

#[test]
fn configured_openai_generator_end_to_end() {
    let completion = serde_json::json!({
        "choices": [{
            "message": {"role": "assistant", "content": MODEL_ANSWER},
            "finish_reason": "stop"
        }]
    });
    let url = serve_once(completion.to_string());
    let dumps = tempfile::tempdir().unwrap();

    let env: HashMap<&str, String> = HashMap::from([
        ("LLM_PROVIDER", "openai".to_string()),
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("LLM_BASE_URL", url),
        ("REQUEST_TIMEOUT_SECS", "10".to_string()),
        ("INCIDENT_COPILOT_DUMP_DIR", dumps.path().display().to_string()),
    ]);
    let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();

    let generated = ReportGenerator::from_config(&config)
        .unwrap()
        .generate_report("orders db failed over")
        .unwrap();

    assert_eq!(generated.report.incident_id.as_deref(), Some("INC-9001"));
    assert_eq!(generated.model, "gpt-4o-2024-08-06");

    let run_dir = dumps.path().join(generated.run_id.to_string());
    assert!(run_dir.join("01-prompt.txt").is_file());
    assert!(run_dir.join("03-result.json").is_file());
}
