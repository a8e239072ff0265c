use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a contact. `Inactive` is reserved in the schema but never set
/// by any code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Pending,
    Active,
    Inactive,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Active => "active",
            ContactStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ContactStatus::Pending),
            "active" => Some(ContactStatus::Active),
            "inactive" => Some(ContactStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AnalysisStatus::Pending),
            "completed" => Some(AnalysisStatus::Completed),
            _ => None,
        }
    }
}

/// One row of `contacts`. The confirmation token is present while a
/// confirmation is outstanding and cleared after successful delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub email: String,
    pub status: ContactStatus,
    pub confirmation_token: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One row of `analyses`. Invariant (backed by a database CHECK): the status
/// is `completed` exactly when `analysis` is non-null.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub id: i64,
    pub contact_id: i64,
    pub situation: String,
    pub analysis: Option<String>,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
}

/// Contact annotated with aggregate analysis information, as returned by the
/// listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ContactSummary {
    pub id: i64,
    pub email: String,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub analysis_count: i64,
    pub last_analysis_at: Option<DateTime<Utc>>,
}
