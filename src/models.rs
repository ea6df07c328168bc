use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DeskError;

pub const SENDER_STUDENT: &str = "Student";
pub const SENDER_ADMIN: &str = "Admin";
pub const SENDER_SUPERADMIN: &str = "SuperAdmin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Escalated,
    Resolved,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Open,
        Status::InProgress,
        Status::Escalated,
        Status::Resolved,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::InProgress => "In Progress",
            Status::Escalated => "Escalated",
            Status::Resolved => "Resolved",
        }
    }

    /// Presentation colour family for the status badge.
    pub fn tone(&self) -> &'static str {
        match self {
            Status::InProgress => "orange",
            Status::Resolved => "green",
            Status::Escalated => "red",
            Status::Open => "gray",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved)
    }

    /// Open → In Progress → {Escalated, Resolved}, Escalated → Resolved,
    /// anything live → Resolved. Nothing leaves Resolved. Re-setting a live
    /// status to itself is allowed so a remark can be recorded on its own.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;
        match (*self, next) {
            (Resolved, _) => false,
            (_, Resolved) => true,
            (a, b) if a == b => true,
            (Open, InProgress) | (Open, Escalated) | (InProgress, Escalated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        Status::ALL
            .into_iter()
            .find(|st| st.label().to_ascii_lowercase() == norm)
            .ok_or_else(|| {
                let known: Vec<&str> = Status::ALL.iter().map(|st| st.label()).collect();
                DeskError::Validation(format!(
                    "unrecognized status '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Ordered by severity: Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Default)]
pub enum Priority {
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    /// Visual weight used for sort/filter emphasis.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Medium => 1,
        }
    }

    pub fn tone(&self) -> &'static str {
        match self {
            Priority::Critical => "red",
            Priority::High => "orange",
            Priority::Medium => "blue",
        }
    }

    /// Lenient parse for the student filing form: unknown values fall back
    /// to Medium.
    pub fn from_form(value: Option<&str>) -> Priority {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(DeskError::Validation(format!(
                "unrecognized priority '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
    Superadmin,
}

impl Role {
    /// Label used on thread messages sent by this role.
    pub fn sender_label(&self) -> &'static str {
        match self {
            Role::Student => SENDER_STUDENT,
            Role::Admin => SENDER_ADMIN,
            Role::Superadmin => SENDER_SUPERADMIN,
        }
    }

    pub fn landing_page(&self) -> &'static str {
        match self {
            Role::Student => "student_dashboard",
            Role::Admin => "normal_admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub text: String,
    /// Local hour:minute at append time. Not sortable across days.
    pub time: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub category: String,
    pub subject: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub student_id: String,
    pub student_name: String,
    pub assigned_admin: String,
    pub department: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub attachments: Vec<String>,
    pub version: u64,
}

/// Fields a student supplies when filing; everything else is generated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub category: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub assigned_admin: Option<String>,
}

/// Department is the first whitespace-delimited token of the category.
pub fn department_for(category: &str) -> String {
    category.split_whitespace().next().unwrap_or("").to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_parse() {
        for s in Status::ALL {
            assert_eq!(s.label().parse::<Status>().unwrap(), s);
        }
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert!("Closed".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_as_display_label() {
        let v = serde_json::to_value(Status::InProgress).unwrap();
        assert_eq!(v, "In Progress");
    }

    #[test]
    fn resolved_is_terminal() {
        for s in Status::ALL {
            assert!(!Status::Resolved.can_transition_to(s));
        }
        for s in [Status::Open, Status::InProgress, Status::Escalated] {
            assert!(s.can_transition_to(Status::Resolved));
        }
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        assert!(!Status::Escalated.can_transition_to(Status::InProgress));
        assert!(!Status::Escalated.can_transition_to(Status::Open));
        assert!(!Status::InProgress.can_transition_to(Status::Open));
        assert!(Status::Open.can_transition_to(Status::InProgress));
        assert!(Status::InProgress.can_transition_to(Status::InProgress));
    }

    #[test]
    fn priority_is_ordered_by_severity() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Critical.weight() > Priority::High.weight());
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn form_priority_falls_back_to_medium() {
        assert_eq!(Priority::from_form(Some("critical")), Priority::Critical);
        assert_eq!(Priority::from_form(Some("HIGH")), Priority::High);
        assert_eq!(Priority::from_form(Some("whenever")), Priority::Medium);
        assert_eq!(Priority::from_form(None), Priority::Medium);
    }

    #[test]
    fn department_is_first_category_token() {
        assert_eq!(department_for("Hostel"), "Hostel");
        assert_eq!(department_for("Finance / Fees"), "Finance");
        assert_eq!(department_for("  Academic  Affairs"), "Academic");
        assert_eq!(department_for(""), "");
    }

    #[test]
    fn case_uses_camel_case_wire_names() {
        let c = Case {
            id: "G-1".into(),
            category: "Hostel".into(),
            subject: "s".into(),
            description: String::new(),
            status: Status::Open,
            priority: Priority::Medium,
            student_id: "U-1".into(),
            student_name: "A".into(),
            assigned_admin: String::new(),
            department: "Hostel".into(),
            timestamp: Utc::now(),
            messages: vec![],
            attachments: vec![],
            version: 1,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["studentId"], "U-1");
        assert_eq!(v["assignedAdmin"], "");
        assert!(v["attachments"].as_array().unwrap().is_empty());
    }
}
