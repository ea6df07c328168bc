//! Role views: each role composes case-store primitives into its own
//! workflow and renders role-scoped view models.

use crate::directory::{AdminUpdate, NewAdmin};
use crate::error::{DeskError, Result};
use crate::models::{Case, Identity, Message, NewCase, Priority, Role, Status, SENDER_STUDENT};
use crate::state::{Desk, PendingAction};
use serde::{Deserialize, Serialize};

// ── Rendering ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRow {
    pub id: String,
    pub category: String,
    pub subject: String,
    pub status: Status,
    pub priority: Priority,
    pub student_name: String,
    pub department: String,
    pub date: String,
    pub status_tone: &'static str,
    pub priority_tone: &'static str,
    pub priority_weight: u8,
    pub version: u64,
}

impl From<&Case> for CaseRow {
    fn from(c: &Case) -> Self {
        CaseRow {
            id: c.id.clone(),
            category: c.category.clone(),
            subject: c.subject.clone(),
            status: c.status,
            priority: c.priority,
            student_name: c.student_name.clone(),
            department: c.department.clone(),
            date: c.timestamp.format("%Y-%m-%d").to_string(),
            status_tone: c.status.tone(),
            priority_tone: c.priority.tone(),
            priority_weight: c.priority.weight(),
            version: c.version,
        }
    }
}

pub fn render_rows(cases: &[Case]) -> Vec<CaseRow> {
    cases.iter().map(CaseRow::from).collect()
}

/// One rendered thread entry. Student messages sit left with an "S"
/// avatar; staff messages sit right with "A".
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatLine {
    pub sender: String,
    pub text: String,
    pub time: String,
    pub avatar: &'static str,
    pub align: &'static str,
}

pub fn render_chat(messages: &[Message]) -> Vec<ChatLine> {
    messages
        .iter()
        .map(|m| {
            let student = m.sender == SENDER_STUDENT;
            ChatLine {
                sender: m.sender.clone(),
                text: m.text.clone(),
                time: m.time.clone(),
                avatar: if student { "S" } else { "A" },
                align: if student { "left" } else { "right" },
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case: Case,
    pub chat: Vec<ChatLine>,
}

impl From<Case> for CaseDetail {
    fn from(case: Case) -> Self {
        let chat = render_chat(&case.messages);
        CaseDetail { case, chat }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaseStats {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub escalated: usize,
    pub resolved: usize,
}

pub fn stats_for(cases: &[Case]) -> CaseStats {
    cases.iter().fold(
        CaseStats {
            total: cases.len(),
            ..Default::default()
        },
        |mut s, c| {
            match c.status {
                Status::Open => s.open += 1,
                Status::InProgress => s.in_progress += 1,
                Status::Escalated => s.escalated += 1,
                Status::Resolved => s.resolved += 1,
            }
            s
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationPrompt {
    pub token: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ConfirmOutcome {
    Resolved { case: CaseDetail },
    Deleted { admin: Identity },
    Cancelled,
}

// ── Shared helpers ───────────────────────────────────────────────────────────

fn find_case(desk: &Desk, id: &str) -> Result<Case> {
    desk.cases.get_by_id(id).ok_or_else(|| {
        tracing::warn!("Case not found: {}", id);
        DeskError::NotFound(format!("case {}", id))
    })
}

fn reply_as(
    desk: &Desk,
    user: &Identity,
    case_id: &str,
    text: &str,
    expected_version: Option<u64>,
) -> Result<CaseDetail> {
    desk.cases
        .append_message(case_id, user.role.sender_label(), text, expected_version)?;
    find_case(desk, case_id).map(CaseDetail::from)
}

fn request_resolve(desk: &Desk, user: &Identity, case_id: &str) -> Result<ConfirmationPrompt> {
    let case = find_case(desk, case_id)?;
    if case.status.is_terminal() {
        return Err(DeskError::InvalidTransition(format!(
            "case {} is already resolved",
            case.id
        )));
    }
    let token = desk.confirmations.request(
        PendingAction::ResolveCase {
            case_id: case.id.clone(),
        },
        &user.id,
    );
    Ok(ConfirmationPrompt {
        token,
        title: "Resolve Case?".to_string(),
        message: format!("Mark case {} as resolved?", case.id),
    })
}

/// Second half of every confirm/cancel round trip. The token is consumed
/// either way.
pub fn confirm(desk: &Desk, user: &Identity, token: &str, accept: bool) -> Result<ConfirmOutcome> {
    let action = desk.confirmations.take(token, &user.id)?;
    if !accept {
        tracing::debug!("{} cancelled {:?}", user.id, action);
        return Ok(ConfirmOutcome::Cancelled);
    }
    match action {
        PendingAction::ResolveCase { case_id } => {
            let case = desk.cases.resolve(&case_id, None)?;
            Ok(ConfirmOutcome::Resolved { case: case.into() })
        }
        PendingAction::DeleteAdmin { admin_id } => {
            if user.role != Role::Superadmin {
                return Err(DeskError::Authorization(
                    "only the superadmin manages admins".to_string(),
                ));
            }
            let admin = desk.directory.delete_admin(&admin_id)?;
            Ok(ConfirmOutcome::Deleted { admin })
        }
    }
}

// ── Student ──────────────────────────────────────────────────────────────────

/// Filing form. `priority` is the raw form value (`medium`, `high`,
/// `critical`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileCase {
    pub category: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub stats: CaseStats,
    pub recent: Vec<CaseRow>,
}

const DASHBOARD_RECENT: usize = 5;

pub struct StudentView<'a> {
    desk: &'a Desk,
    user: Identity,
}

impl<'a> StudentView<'a> {
    pub fn new(desk: &'a Desk, user: Identity) -> Self {
        StudentView { desk, user }
    }

    fn own_case(&self, id: &str) -> Result<Case> {
        let case = find_case(self.desk, id)?;
        if case.student_id != self.user.id {
            tracing::warn!("{} tried to open {} owned by {}", self.user.id, id, case.student_id);
            return Err(DeskError::Authorization(format!(
                "case {} belongs to another student",
                id
            )));
        }
        Ok(case)
    }

    pub fn file_case(&self, form: FileCase) -> Result<Case> {
        self.desk.cases.create(NewCase {
            category: form.category,
            subject: form.subject,
            description: form.description,
            priority: Some(Priority::from_form(form.priority.as_deref())),
            student_id: self.user.id.clone(),
            student_name: self.user.name.clone(),
            assigned_admin: None,
        })
    }

    pub fn my_cases(&self) -> Vec<CaseRow> {
        render_rows(&self.desk.cases.list_by_student(&self.user.id))
    }

    pub fn dashboard(&self) -> StudentDashboard {
        let cases = self.desk.cases.list_by_student(&self.user.id);
        StudentDashboard {
            stats: stats_for(&cases),
            recent: cases.iter().take(DASHBOARD_RECENT).map(CaseRow::from).collect(),
        }
    }

    pub fn open_case(&self, id: &str) -> Result<CaseDetail> {
        self.own_case(id).map(CaseDetail::from)
    }

    pub fn reply(&self, id: &str, text: &str, expected_version: Option<u64>) -> Result<CaseDetail> {
        self.own_case(id)?;
        reply_as(self.desk, &self.user, id, text, expected_version)
    }
}

// ── Admin ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentCases {
    pub department: String,
    pub cases: Vec<CaseRow>,
}

pub struct AdminView<'a> {
    desk: &'a Desk,
    user: Identity,
}

impl<'a> AdminView<'a> {
    pub fn new(desk: &'a Desk, user: Identity) -> Self {
        AdminView { desk, user }
    }

    /// Explicit department, else the admin's own, else the configured
    /// default.
    pub fn department_cases(&self, department: Option<&str>) -> DepartmentCases {
        let department = department
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| self.user.department.clone())
            .unwrap_or_else(|| self.desk.config.default_department.clone());
        tracing::debug!("{} listing department {}", self.user.id, department);
        let cases = render_rows(&self.desk.cases.list_by_department(&department));
        DepartmentCases { department, cases }
    }

    pub fn open_case(&self, id: &str) -> Result<CaseDetail> {
        find_case(self.desk, id).map(CaseDetail::from)
    }

    pub fn reply(&self, id: &str, text: &str, expected_version: Option<u64>) -> Result<CaseDetail> {
        reply_as(self.desk, &self.user, id, text, expected_version)
    }

    /// Status change with a mandatory remark recorded in the thread.
    pub fn change_status(
        &self,
        id: &str,
        status: &str,
        remark: &str,
        expected_version: Option<u64>,
    ) -> Result<CaseDetail> {
        let status: Status = status.parse()?;
        self.desk
            .cases
            .change_status_with_remark(
                id,
                status,
                self.user.role.sender_label(),
                remark,
                expected_version,
            )
            .map(CaseDetail::from)
    }

    pub fn set_priority(
        &self,
        id: &str,
        priority: &str,
        expected_version: Option<u64>,
    ) -> Result<CaseDetail> {
        let priority: Priority = priority.parse()?;
        self.desk
            .cases
            .set_priority(id, priority, expected_version)
            .map(CaseDetail::from)
    }

    pub fn escalate(&self, id: &str, expected_version: Option<u64>) -> Result<CaseDetail> {
        self.desk
            .cases
            .escalate(id, expected_version)
            .map(CaseDetail::from)
    }

    pub fn request_resolve(&self, id: &str) -> Result<ConfirmationPrompt> {
        request_resolve(self.desk, &self.user, id)
    }
}

// ── SuperAdmin ───────────────────────────────────────────────────────────────

pub struct SuperAdminView<'a> {
    desk: &'a Desk,
    user: Identity,
}

impl<'a> SuperAdminView<'a> {
    pub fn new(desk: &'a Desk, user: Identity) -> Self {
        SuperAdminView { desk, user }
    }

    pub fn escalated(&self) -> Vec<CaseRow> {
        render_rows(&self.desk.cases.list_escalated())
    }

    pub fn all_cases(&self) -> Vec<CaseRow> {
        render_rows(&self.desk.cases.list_all())
    }

    pub fn open_case(&self, id: &str) -> Result<CaseDetail> {
        find_case(self.desk, id).map(CaseDetail::from)
    }

    pub fn reply(&self, id: &str, text: &str, expected_version: Option<u64>) -> Result<CaseDetail> {
        reply_as(self.desk, &self.user, id, text, expected_version)
    }

    pub fn request_resolve(&self, id: &str) -> Result<ConfirmationPrompt> {
        request_resolve(self.desk, &self.user, id)
    }

    pub fn admins(&self) -> Vec<Identity> {
        self.desk.directory.list_admins()
    }

    pub fn create_admin(&self, new: NewAdmin) -> Result<Identity> {
        self.desk.directory.create_admin(new)
    }

    pub fn update_admin(&self, id: &str, update: AdminUpdate) -> Result<Identity> {
        self.desk.directory.update_admin(id, update)
    }

    pub fn request_delete_admin(&self, id: &str) -> Result<ConfirmationPrompt> {
        let admin = self
            .admins()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| {
                tracing::warn!("Admin not found: {}", id);
                DeskError::NotFound(format!("admin {}", id))
            })?;
        let token = self.desk.confirmations.request(
            PendingAction::DeleteAdmin {
                admin_id: admin.id.clone(),
            },
            &self.user.id,
        );
        Ok(ConfirmationPrompt {
            token,
            title: "Delete Admin?".to_string(),
            message: format!("Are you sure you want to remove \"{}\"?", admin.name),
        })
    }
}
