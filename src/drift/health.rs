use crate::compat::{CompatibilityReport, CompatibilityStatus};
use serde::{Deserialize, Serialize};

/// Composite health verdict for deploy pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Pending { count: usize },
    Degraded { reason: String },
    Incompatible { reason: String },
    Error { detail: String },
}

impl HealthStatus {
    /// 0 healthy, 1 actionable, 2 fatal.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Pending { .. } | Self::Degraded { .. } => 1,
            Self::Incompatible { .. } | Self::Error { .. } => 2,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Healthy => "database is up to date and compatible".to_string(),
            Self::Pending { count } => format!("{} pending migration(s)", count),
            Self::Degraded { reason } => format!("degraded compatibility: {}", reason),
            Self::Incompatible { reason } => format!("incompatible: {}", reason),
            Self::Error { detail } => format!("integrity failure: {}", detail),
        }
    }
}

/// Fold the individual checks into one verdict, worst first.
pub fn evaluate_health(
    integrity_issues: &[String],
    compatibility: &CompatibilityReport,
    pending: usize,
) -> HealthStatus {
    if !integrity_issues.is_empty() {
        return HealthStatus::Error {
            detail: integrity_issues.join("; "),
        };
    }

    let reason = || {
        compatibility
            .note
            .clone()
            .or_else(|| compatibility.issues.first().cloned())
            .unwrap_or_else(|| {
                format!(
                    "runtime {} vs database {}",
                    compatibility.runtime_version, compatibility.current_db_version
                )
            })
    };

    match compatibility.status {
        CompatibilityStatus::Incompatible => HealthStatus::Incompatible { reason: reason() },
        _ if pending > 0 => HealthStatus::Pending { count: pending },
        CompatibilityStatus::Degraded => HealthStatus::Degraded { reason: reason() },
        CompatibilityStatus::Compatible | CompatibilityStatus::Uninitialized => HealthStatus::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: CompatibilityStatus) -> CompatibilityReport {
        CompatibilityReport {
            status,
            current_db_version: "1".into(),
            runtime_version: "1.0.0".into(),
            matched_rule: None,
            note: None,
            issues: vec![],
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(evaluate_health(&[], &report(CompatibilityStatus::Compatible), 0).exit_code(), 0);
        assert_eq!(evaluate_health(&[], &report(CompatibilityStatus::Compatible), 2).exit_code(), 1);
        assert_eq!(evaluate_health(&[], &report(CompatibilityStatus::Degraded), 0).exit_code(), 1);
        assert_eq!(evaluate_health(&[], &report(CompatibilityStatus::Incompatible), 3).exit_code(), 2);
        assert_eq!(
            evaluate_health(&["tampered".into()], &report(CompatibilityStatus::Compatible), 0).exit_code(),
            2
        );
    }

    #[test]
    fn test_pending_reported_before_degraded() {
        let status = evaluate_health(&[], &report(CompatibilityStatus::Degraded), 4);
        assert_eq!(status, HealthStatus::Pending { count: 4 });
    }

    #[test]
    fn test_serializes_tagged() {
        let json = serde_json::to_string(&HealthStatus::Pending { count: 2 }).unwrap();
        assert_eq!(json, r#"{"status":"pending","count":2}"#);
    }
}
