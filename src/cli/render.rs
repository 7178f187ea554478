//! Human-readable output. Quiet mode prints the serde structs as JSON instead.

use crate::drift::FileIssue;
use crate::{
    CompatibilityReport, Direction, DriftReport, FileValidationReport, IntegrityReport,
    MigrationListing, MigrationReport, MigrationStatus, SchemaState, StepOutcome,
};

const RULE: &str = "----------------------------------------";

/// Join report lines, each terminated by a newline.
fn finish(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}

fn version_or_none(version: &str) -> &str {
    if version.is_empty() { "(none)" } else { version }
}

pub fn status(status: &MigrationStatus) -> String {
    let mut lines = vec![
        format!("Migration status: {}", status.overall),
        format!("Current database version: {}", version_or_none(&status.current_db_version)),
        RULE.to_string(),
        format!("Applied ({}):", status.applied.len()),
    ];

    for record in &status.applied {
        let mut line = format!(
            "  {:<12} {:<32} {}",
            record.version,
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(ms) = record.execution_time_ms {
            line.push_str(&format!(" ({}ms)", ms));
        }
        lines.push(line);
    }

    lines.push(format!("Pending ({}):", status.pending.len()));
    for pending in &status.pending {
        lines.push(format!("  {:<12} {}", pending.version, pending.name));
    }

    if !status.issues.is_empty() {
        lines.push(format!("Issues ({}):", status.issues.len()));
        lines.extend(status.issues.iter().map(|issue| format!("  - {}", issue)));
    }
    finish(lines)
}

pub fn compatibility(report: &CompatibilityReport) -> String {
    let mut lines = vec![
        format!("Compatibility: {}", report.status),
        format!("  runtime version:  {}", report.runtime_version),
        format!("  database version: {}", version_or_none(&report.current_db_version)),
    ];
    if let Some(rule) = &report.matched_rule {
        lines.push(format!("  matched rule:     {}", rule));
    }
    if let Some(note) = &report.note {
        lines.push(format!("  note:             {}", note));
    }
    lines.extend(report.issues.iter().map(|issue| format!("  - {}", issue)));
    finish(lines)
}

pub fn migration_report(report: &MigrationReport) -> String {
    if report.steps.is_empty() {
        return "Nothing to do.\n".to_string();
    }

    let verb = match (report.dry_run, report.direction) {
        (true, _) => "Planned",
        (false, Direction::Up) => "Applied",
        (false, Direction::Down) => "Rolled back",
    };
    let mut lines = vec![format!("{} {} migration(s):", verb, report.steps.len())];
    for step in &report.steps {
        let mut line = format!("  {:<12} {}", step.version, step.name);
        match (step.outcome, step.execution_time_ms) {
            (StepOutcome::Planned, _) => line.push_str(" (dry run)"),
            (_, Some(ms)) => line.push_str(&format!(" ({}ms)", ms)),
            _ => {}
        }
        lines.push(line);
    }
    finish(lines)
}

fn file_issue(issue: &FileIssue) -> String {
    format!("  [{:?}] {}", issue.severity, issue.message)
}

fn verdict(passed: bool) -> &'static str {
    if passed { "PASS" } else { "FAIL" }
}

pub fn validation(files: &FileValidationReport, integrity: &IntegrityReport) -> String {
    let mut lines = vec![format!(
        "Migration files: {} ({} checked)",
        verdict(files.passed()),
        files.checked
    )];
    lines.extend(files.errors().chain(files.warnings()).map(file_issue));

    lines.push(format!(
        "Applied records: {} ({} checked)",
        verdict(integrity.passed()),
        integrity.checked
    ));
    lines.extend(integrity.issues.iter().map(|issue| format!("  [Error] {}", issue.message)));
    finish(lines)
}

pub fn schema_state(state: &SchemaState) -> String {
    let mut lines = vec![
        format!("Schema checksum: {}", state.checksum),
        RULE.to_string(),
        format!("Tables ({}):", state.tables.len()),
    ];

    for table in &state.tables {
        lines.push(format!("  {} [{}]", table.name, short(&table.checksum)));
        for column in &table.columns {
            let mut line = format!("    {} {}", column.name, column.data_type);
            if column.primary_key {
                line.push_str(" PRIMARY KEY");
            }
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default_value {
                line.push_str(&format!(" DEFAULT {}", default));
            }
            if let Some(fk) = &column.foreign_key {
                line.push_str(&format!(" REFERENCES {}", fk));
            }
            lines.push(line);
        }
    }

    lines.push(format!("Indexes ({}):", state.indexes.len()));
    for index in &state.indexes {
        lines.push(format!(
            "  {} ON {} ({}){}",
            index.name,
            index.table,
            index.columns.join(", "),
            if index.unique { " UNIQUE" } else { "" }
        ));
    }

    lines.push(format!("Functions ({}):", state.functions.len()));
    for function in &state.functions {
        lines.push(format!("  {} {} [{}]", function.kind, function.name, short(&function.checksum)));
    }
    finish(lines)
}

pub fn drift(report: &DriftReport) -> String {
    let mut lines = vec![
        format!(
            "Schema drift: {}",
            if report.is_identical { "none" } else { "DETECTED" }
        ),
        format!("  baseline: {}", report.baseline),
        format!("  expected checksum: {}", report.expected_checksum),
        format!("  actual checksum:   {}", report.actual_checksum),
    ];

    let sections = [
        ("Missing tables", &report.missing_tables),
        ("Extra tables", &report.extra_tables),
        ("Drift", &report.schema_drift),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        lines.push(format!("{}:", title));
        lines.extend(items.iter().map(|item| format!("  - {}", item)));
    }
    finish(lines)
}

pub fn listing(listing: &MigrationListing) -> String {
    let mut lines = vec![format!(
        "Migrations in {} ({}):",
        listing.source.as_deref().unwrap_or("registry"),
        listing.migrations.len()
    )];
    for m in &listing.migrations {
        let mut line = format!("  {:<12} {:<32} [{}]", m.version, m.name, short(&m.checksum));
        if !m.reversible {
            line.push_str(" irreversible");
        }
        if m.min_runtime_version.is_some() || m.max_runtime_version.is_some() {
            line.push_str(&format!(
                " runtime {}..{}",
                m.min_runtime_version.as_deref().unwrap_or(""),
                m.max_runtime_version.as_deref().unwrap_or("")
            ));
        }
        lines.push(line);
        if let Some(description) = &m.description {
            lines.push(format!("      {}", description));
        }
    }
    finish(lines)
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_terminates_every_line() {
        assert_eq!(finish(vec!["a".into(), "b".into()]), "a\nb\n");
        assert_eq!(finish(Vec::new()), "");
    }

    #[test]
    fn test_short_checksum() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
