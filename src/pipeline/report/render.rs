use std::fmt::Write;

use super::types::{IncidentReport, Omissions};

const NONE_REPORTED: &str = "_None reported._";

/// Render a report as the standard Markdown incident write-up.
pub fn to_markdown(report: &IncidentReport, omissions: &Omissions) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Incident Report: {}", report.title);
    if let Some(id) = report.incident_id.as_deref() {
        let _ = writeln!(md, "\n**Incident ID:** {id}");
    }

    section(&mut md, "Executive Summary", &prose(&report.executive_summary));

    let systems: Vec<String> = report
        .affected_systems
        .iter()
        .map(|system| format!("- {system}"))
        .collect();
    section(&mut md, "Affected Systems", &list(&systems));

    let timeline: Vec<String> = report
        .timeline
        .iter()
        .map(|event| {
            let severity = event
                .severity
                .as_ref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            format!("**{}** - {}{severity}", event.timestamp, event.description)
        })
        .collect();
    section(&mut md, "Timeline", &list(&timeline));

    section(&mut md, "Root Cause Analysis", &prose(&report.root_cause_hypothesis));
    section(&mut md, "Impact Assessment", &prose(&report.impact_assessment));
    section(&mut md, "Resolution", &prose(&report.resolution_summary));

    let actions: Vec<String> = report
        .action_items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mut line = format!("{}. **[{}]** {}", i + 1, item.priority, item.description);
            if let Some(who) = item.assignee.as_deref() {
                let _ = write!(line, " (Assigned: {who})");
            }
            if let Some(when) = item.estimated_completion.as_deref() {
                let _ = write!(line, " (Due: {when})");
            }
            line
        })
        .collect();
    section(&mut md, "Action Items", &list(&actions));

    if !report.related_incidents.is_empty() {
        let related: Vec<String> = report
            .related_incidents
            .iter()
            .map(|incident| format!("- {incident}"))
            .collect();
        section(&mut md, "Related Incidents", &list(&related));
    }

    if !omissions.is_empty() {
        let total = omissions.total();
        let noun = if total == 1 { "entry" } else { "entries" };
        let _ = writeln!(
            md,
            "\n---\n_{total} malformed {noun} omitted from the model output._"
        );
    }

    md
}

/// Chat post wrapping the Markdown report in a code block.
pub fn to_slack_text(report: &IncidentReport, omissions: &Omissions) -> String {
    format!(
        "📊 *Incident Report Generated*\n\n```\n{}\n```",
        to_markdown(report, omissions).trim_end()
    )
}

fn section(md: &mut String, heading: &str, body: &str) {
    let _ = writeln!(md, "\n## {heading}\n{body}");
}

fn prose(text: &str) -> String {
    if text.trim().is_empty() {
        NONE_REPORTED.to_string()
    } else {
        text.trim().to_string()
    }
}

fn list(lines: &[String]) -> String {
    if lines.is_empty() {
        NONE_REPORTED.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::report::types::{ActionItem, Priority, Severity, TimelineEvent};

    fn sample_report() -> IncidentReport {
        IncidentReport {
            incident_id: Some("INC-7".into()),
            title: "Login failures".into(),
            executive_summary: "SSO tokens were rejected for 40 minutes.".into(),
            affected_systems: vec!["auth-service".into(), "web".into()],
            timeline: vec![
                TimelineEvent {
                    timestamp: "10:00".into(),
                    description: "Certificate rotated".into(),
                    severity: Some(Severity::Info),
                },
                TimelineEvent {
                    timestamp: "10:03".into(),
                    description: "Login errors reported".into(),
                    severity: None,
                },
            ],
            root_cause_hypothesis: "New certificate missing from trust store".into(),
            impact_assessment: "All users unable to log in".into(),
            resolution_summary: "Trust store updated".into(),
            action_items: vec![
                ActionItem {
                    description: "Automate trust store sync".into(),
                    priority: Priority::High,
                    assignee: Some("platform".into()),
                    estimated_completion: None,
                },
                ActionItem {
                    description: "Write runbook".into(),
                    priority: Priority::Low,
                    assignee: None,
                    estimated_completion: Some("next sprint".into()),
                },
            ],
            related_incidents: vec![],
        }
    }

    #[test]
    fn markdown_has_all_sections_in_order() {
        let md = to_markdown(&sample_report(), &Omissions::default());
        let headings = [
            "# Incident Report: Login failures",
            "## Executive Summary",
            "## Affected Systems",
            "## Timeline",
            "## Root Cause Analysis",
            "## Impact Assessment",
            "## Resolution",
            "## Action Items",
        ];
        let mut last = 0;
        for heading in headings {
            let pos = md.find(heading).unwrap_or_else(|| panic!("missing {heading}"));
            assert!(pos >= last, "{heading} out of order");
            last = pos;
        }
        assert!(!md.contains("## Related Incidents"));
        assert!(!md.contains("omitted"));
    }

    #[test]
    fn timeline_and_action_lines_formatted() {
        let md = to_markdown(&sample_report(), &Omissions::default());
        assert!(md.contains("**10:00** - Certificate rotated [info]"));
        assert!(md.contains("**10:03** - Login errors reported\n"));
        assert!(md.contains("1. **[high]** Automate trust store sync (Assigned: platform)"));
        assert!(md.contains("2. **[low]** Write runbook (Due: next sprint)"));
        assert!(md.contains("- auth-service\n- web"));
        assert!(md.contains("**Incident ID:** INC-7"));
    }

    #[test]
    fn empty_sections_say_none_reported() {
        let mut report = sample_report();
        report.affected_systems.clear();
        report.action_items.clear();
        report.impact_assessment = String::new();

        let md = to_markdown(&report, &Omissions::default());
        assert!(md.contains("## Affected Systems\n_None reported._"));
        assert!(md.contains("## Impact Assessment\n_None reported._"));
        assert!(md.contains("## Action Items\n_None reported._"));
    }

    #[test]
    fn related_incidents_and_omissions_rendered() {
        let mut report = sample_report();
        report.related_incidents = vec!["INC-3".into()];
        let omissions = Omissions {
            timeline_events: 2,
            ..Omissions::default()
        };

        let md = to_markdown(&report, &omissions);
        assert!(md.contains("## Related Incidents\n- INC-3"));
        assert!(md.contains("_2 malformed entries omitted from the model output._"));
    }

    #[test]
    fn slack_text_wraps_markdown() {
        let text = to_slack_text(&sample_report(), &Omissions::default());
        assert!(text.starts_with("📊 *Incident Report Generated*"));
        assert!(text.contains("```\n# Incident Report: Login failures"));
        assert!(text.ends_with("```"));
    }
}
