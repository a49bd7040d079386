//! Shared output formatting for lint results.

use anyhow::Result;
use miette::{GraphicalReportHandler, GraphicalTheme};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use template_lint_core::{Diagnostic, DiagnosticReport, LintReport, Position, Severity, TemplateFile};

use crate::OutputFormat;

/// Longest source excerpt printed below a diagnostic in text output.
const SNIPPET_WIDTH: usize = 100;

/// Print lint results in the specified format.
pub fn print(report: &LintReport, format: OutputFormat, cwd: &Path, color: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write(&mut out, report, format, cwd, color)?;
    out.flush()?;
    Ok(())
}

/// Writes lint results in the specified format.
pub fn write(
    out: &mut impl Write,
    report: &LintReport,
    format: OutputFormat,
    cwd: &Path,
    color: bool,
) -> Result<()> {
    match format {
        OutputFormat::Text => write_text(out, report, cwd, color)?,
        OutputFormat::Compact => write_compact(out, report, cwd)?,
        OutputFormat::Json => write_json(out, report, cwd)?,
        OutputFormat::Pretty => write_pretty(out, report, color)?,
    }
    Ok(())
}

fn display_path(path: &Path, cwd: &Path) -> String {
    path.strip_prefix(cwd).unwrap_or(path).display().to_string()
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

fn severity_code(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "91",
        Severity::Warn => "93",
        Severity::Info => "96",
    }
}

fn start_position(file: &TemplateFile, diagnostic: &Diagnostic) -> Option<Position> {
    diagnostic.position.and_then(|span| file.position(span.start))
}

fn snippet(file: &TemplateFile, diagnostic: &Diagnostic) -> Option<String> {
    let text = diagnostic.position?.slice(file.source())?;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > SNIPPET_WIDTH {
        let cut: String = line.chars().take(SNIPPET_WIDTH - 3).collect();
        Some(format!("{cut}..."))
    } else {
        Some(line.to_string())
    }
}

fn write_text(out: &mut impl Write, report: &LintReport, cwd: &Path, color: bool) -> Result<()> {
    let (errors, warnings, infos) = report.count_by_severity();

    for (path, file_report) in &report.files {
        if file_report.diagnostics.is_empty() {
            continue;
        }
        writeln!(out, "{}", paint(&format!("{}:", display_path(path, cwd)), "36", color))?;

        let file = &file_report.file;
        for diagnostic in &file_report.diagnostics {
            let severity = diagnostic.severity.to_string();
            let mut line = format!("  {}", paint(&severity, severity_code(diagnostic.severity), color));
            if let Some(position) = start_position(file, diagnostic) {
                line.push_str(&format!(" ({position})"));
            }
            line.push_str(&format!(": {}", diagnostic.message));
            if let Some(rule) = &diagnostic.rule {
                line.push_str(&format!(" {}", paint(&format!("({rule})"), "90", color)));
            }
            writeln!(out, "{line}")?;

            if let Some(details) = &diagnostic.details {
                writeln!(out, "    = {details}")?;
            }
            if let Some(text) = snippet(file, diagnostic) {
                writeln!(out, "{}", paint(&format!("    {text}"), "90", color))?;
            }
            writeln!(out)?;
        }
    }

    let count = |n: usize, label: &str, code: &str| {
        let text = format!("{n} {label}");
        if n > 0 {
            paint(&text, code, color)
        } else {
            text
        }
    };
    writeln!(
        out,
        "Linted {} file(s): {}, {}, {}",
        report.files_checked(),
        count(errors, "error(s)", severity_code(Severity::Error)),
        count(warnings, "warning(s)", severity_code(Severity::Warn)),
        count(infos, "hint(s)", severity_code(Severity::Info)),
    )?;
    Ok(())
}

fn write_compact(out: &mut impl Write, report: &LintReport, cwd: &Path) -> Result<()> {
    for (path, file_report) in &report.files {
        let path = display_path(path, cwd);
        for diagnostic in &file_report.diagnostics {
            let location = match start_position(&file_report.file, diagnostic) {
                Some(position) => format!("{path}:{position}"),
                None => path.clone(),
            };
            let rule = diagnostic
                .rule
                .as_deref()
                .map(|rule| format!(" [{rule}]"))
                .unwrap_or_default();
            writeln!(
                out,
                "{location}: {}{rule} {}",
                diagnostic.severity, diagnostic.message
            )?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    files: Vec<JsonFile<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    file: String,
    diagnostics: Vec<JsonDiagnostic<'a>>,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    #[serde(flatten)]
    diagnostic: &'a Diagnostic,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<Position>,
}

#[derive(Serialize)]
struct JsonSummary {
    files_checked: usize,
    errors: usize,
    warnings: usize,
    infos: usize,
}

fn write_json(out: &mut impl Write, report: &LintReport, cwd: &Path) -> Result<()> {
    let files = report
        .files
        .iter()
        .map(|(path, file_report)| JsonFile {
            file: display_path(path, cwd),
            diagnostics: file_report
                .diagnostics
                .iter()
                .map(|diagnostic| JsonDiagnostic {
                    diagnostic,
                    start: diagnostic
                        .position
                        .and_then(|span| file_report.file.position(span.start)),
                    end: diagnostic
                        .position
                        .and_then(|span| file_report.file.position(span.end)),
                })
                .collect(),
        })
        .collect();

    let (errors, warnings, infos) = report.count_by_severity();
    let output = JsonOutput {
        files,
        summary: JsonSummary {
            files_checked: report.files_checked(),
            errors,
            warnings,
            infos,
        },
    };
    serde_json::to_writer_pretty(&mut *out, &output)?;
    writeln!(out)?;
    Ok(())
}

fn write_pretty(out: &mut impl Write, report: &LintReport, color: bool) -> Result<()> {
    let theme = if color {
        GraphicalTheme::unicode()
    } else {
        GraphicalTheme::unicode_nocolor()
    };
    let handler = GraphicalReportHandler::new_themed(theme);

    for file_report in report.files.values() {
        for diagnostic in &file_report.diagnostics {
            let rich = DiagnosticReport::new(&file_report.file, diagnostic);
            let mut rendered = String::new();
            handler.render_report(&mut rendered, &rich)?;
            writeln!(out, "{rendered}")?;
        }
    }
    let (errors, warnings, infos) = report.count_by_severity();
    writeln!(
        out,
        "Linted {} file(s): {errors} error(s), {warnings} warning(s), {infos} hint(s)",
        report.files_checked()
    )?;
    Ok(())
}
