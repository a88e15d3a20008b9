use crate::error::ApplybotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form content fields of a submission, keyed by normalized field name
pub type ApplicationContent = BTreeMap<String, String>;

/// Review status of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected are final outcomes
    pub fn is_decided(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An administrator decision; the only statuses an application can move to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl FromStr for Decision {
    type Err = ApplybotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(ApplybotError::InvalidDecision {
                value: other.to_string(),
            }),
        }
    }
}

impl From<Decision> for ApplicationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ApplicationStatus::Approved,
            Decision::Rejected => ApplicationStatus::Rejected,
        }
    }
}

/// Who sent a submission over the chat channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitterIdentity {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SubmitterIdentity {
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        match (&self.username, full_name.is_empty()) {
            (Some(username), true) => format!("@{}", username),
            (Some(username), false) => format!("{} (@{})", full_name, username),
            (None, false) => full_name,
            (None, true) => format!("user {}", self.user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub submitter: SubmitterIdentity,
    pub content: ApplicationContent,
    pub status: ApplicationStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission handed to the store; the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub submitter: SubmitterIdentity,
    pub content: ApplicationContent,
}

impl NewApplication {
    pub fn into_application(self, id: String, now: DateTime<Utc>) -> Application {
        Application {
            id,
            submitter: self.submitter,
            content: self.content,
            status: ApplicationStatus::Pending,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl ApplicationStats {
    pub fn from_applications(applications: &[Application]) -> Self {
        applications
            .iter()
            .fold(Self::default(), |mut stats, application| {
                stats.total += 1;
                match application.status {
                    ApplicationStatus::Pending => stats.pending += 1,
                    ApplicationStatus::Approved => stats.approved += 1,
                    ApplicationStatus::Rejected => stats.rejected += 1,
                }
                stats
            })
    }
}

/// Lowercase, trim and snake-case a field name
pub fn normalize_field_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approved);
        assert_eq!("rejected".parse::<Decision>().unwrap(), Decision::Rejected);

        for invalid in ["archived", "pending", "Approved", ""] {
            match invalid.parse::<Decision>() {
                Err(ApplybotError::InvalidDecision { value }) => assert_eq!(value, invalid),
                other => panic!("Expected InvalidDecision for {:?}, got {:?}", invalid, other),
            }
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::Approved).unwrap(),
            "\"approved\""
        );
        assert!(ApplicationStatus::Rejected.is_decided());
        assert!(!ApplicationStatus::Pending.is_decided());
    }

    #[test]
    fn test_display_name() {
        let mut identity = SubmitterIdentity {
            user_id: 5,
            chat_id: 5,
            username: Some("jdoe".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
        };
        assert_eq!(identity.display_name(), "Jane Doe (@jdoe)");

        identity.first_name = None;
        identity.last_name = None;
        assert_eq!(identity.display_name(), "@jdoe");

        identity.username = None;
        assert_eq!(identity.display_name(), "user 5");
    }

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("  Phone Number "), "phone_number");
        assert_eq!(normalize_field_name("NAME"), "name");
    }
}
