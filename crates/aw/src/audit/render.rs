//! Human-readable text rendering of an [`AuditReport`], for the `aw-cli`
//! `audit` subcommand's default (non-`--json`) output.

use std::fmt::Write as _;

use aw_types::report::AuditReport;

pub fn render_text(report: &AuditReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Run {} ({})", report.overview.run_id, report.overview.workflow_name);
    let _ = writeln!(out, "  status: {:?}", report.overview.status);
    if let Some(conclusion) = report.overview.conclusion {
        let _ = writeln!(out, "  conclusion: {conclusion:?}");
    }
    if report.partial {
        let _ = writeln!(out, "  WARNING: report is partial, some artifacts were missing");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Metrics:");
    let _ = writeln!(out, "  tokens: {} in / {} out", report.metrics.input_tokens, report.metrics.output_tokens);
    let _ = writeln!(out, "  estimated cost: ${:.4}", report.metrics.estimated_cost_usd);
    let _ = writeln!(out, "  turns: {}", report.metrics.turn_count);
    let _ = writeln!(out, "  errors: {}, warnings: {}", report.metrics.error_count, report.metrics.warning_count);

    if !report.metrics.by_tool.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Tool calls:");
        for (name, stats) in &report.metrics.by_tool {
            let _ = writeln!(
                out,
                "  {name}: {} calls, avg {:.1}ms, max {}ms, {} errors",
                stats.call_count,
                stats.avg_duration_ms(),
                stats.max_duration_ms,
                stats.error_count
            );
        }
    }

    if !report.firewall_denied_domains.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Firewall denials: {}", report.firewall_denied_domains.join(", "));
    }

    if !report.missing_tools.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Missing tools: {}", report.missing_tools.join(", "));
    }

    if !report.errors_and_warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors and warnings:");
        for entry in &report.errors_and_warnings {
            let _ = writeln!(out, "  [{}] {} ({})", entry.severity, entry.message, entry.source);
        }
    }

    if report.redacted_domains.redacted_count > 0 {
        let _ = writeln!(
            out,
            "\nRedacted {} secret-shaped substring(s) before reporting",
            report.redacted_domains.redacted_count
        );
    }

    out
}
