use crate::config::DeskConfig;
use crate::directory::Directory;
use crate::error::{DeskError, Result};
use crate::models::{department_for, Case, Message, NewCase, Priority, Status};
use chrono::{DateTime, Local, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const CASE_ID_PREFIX: &str = "G-";
const FIRST_CASE_NUMBER: u64 = 1000;

// ── Case Record (stored in DashMap) ──────────────────────────────────────────
// `seq` is the insertion sequence. Listing sorts on it descending so the
// newest case comes first, which is the "prepend on create" order.
#[derive(Debug, Clone)]
struct CaseRecord {
    seq: u64,
    case: Case,
}

// ── Case Store ───────────────────────────────────────────────────────────────
// Single source of truth for every case. Each mutation runs under the
// DashMap shard lock for that case and is applied to a draft first, so a
// rejected mutation leaves the stored case untouched.
#[derive(Clone)]
pub struct CaseStore {
    cases: Arc<DashMap<String, CaseRecord>>,
    insert_seq: Arc<AtomicU64>,
    next_number: Arc<AtomicU64>,
}

impl Default for CaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseStore {
    pub fn new() -> Self {
        CaseStore {
            cases: Arc::new(DashMap::new()),
            insert_seq: Arc::new(AtomicU64::new(0)),
            next_number: Arc::new(AtomicU64::new(FIRST_CASE_NUMBER)),
        }
    }

    fn sorted(&self, keep: impl Fn(&Case) -> bool) -> Vec<Case> {
        let mut records: Vec<CaseRecord> = self
            .cases
            .iter()
            .filter(|r| keep(&r.case))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq));
        records.into_iter().map(|r| r.case).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Every case, newest-created first.
    pub fn list_all(&self) -> Vec<Case> {
        self.sorted(|_| true)
    }

    pub fn list_by_student(&self, student_id: &str) -> Vec<Case> {
        self.sorted(|c| c.student_id == student_id)
    }

    /// Exact, case-sensitive department match.
    pub fn list_by_department(&self, department: &str) -> Vec<Case> {
        self.sorted(|c| c.department == department)
    }

    /// Cases needing superadmin attention: critical or escalated.
    pub fn list_escalated(&self) -> Vec<Case> {
        self.sorted(|c| c.priority == Priority::Critical || c.status == Status::Escalated)
    }

    pub fn get_by_id(&self, id: &str) -> Option<Case> {
        self.cases.get(id).map(|r| r.case.clone())
    }

    /// Reserve numeric ids at or below `id`'s number so generated ids never
    /// collide with ids inserted from outside (seed data).
    fn bump_past(&self, id: &str) {
        if let Some(n) = id
            .strip_prefix(CASE_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
        {
            self.next_number.fetch_max(n + 1, Ordering::AcqRel);
        }
    }

    /// Insert a fully-formed case at the front. Rejects a duplicate id.
    pub fn insert(&self, case: Case) -> Result<Case> {
        match self.cases.entry(case.id.clone()) {
            Entry::Occupied(_) => Err(DeskError::Conflict(format!(
                "case {} already exists",
                case.id
            ))),
            Entry::Vacant(vac) => {
                self.bump_past(&case.id);
                let seq = self.insert_seq.fetch_add(1, Ordering::AcqRel);
                vac.insert(CaseRecord {
                    seq,
                    case: case.clone(),
                });
                Ok(case)
            }
        }
    }

    pub fn create(&self, new: NewCase) -> Result<Case> {
        let subject = new.subject.trim();
        if subject.is_empty() {
            return Err(DeskError::Validation("subject is required".to_string()));
        }
        let category = new.category.trim();
        if category.is_empty() {
            return Err(DeskError::Validation("category is required".to_string()));
        }
        if new.student_id.trim().is_empty() {
            return Err(DeskError::Validation("student id is required".to_string()));
        }

        // Atomic check-and-insert via DashMap::entry(): a taken number is
        // skipped rather than overwritten.
        loop {
            let n = self.next_number.fetch_add(1, Ordering::AcqRel);
            let id = format!("{}{}", CASE_ID_PREFIX, n);
            match self.cases.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vac) => {
                    let case = Case {
                        id,
                        category: category.to_string(),
                        subject: subject.to_string(),
                        description: new.description.trim().to_string(),
                        status: Status::Open,
                        priority: new.priority.unwrap_or_default(),
                        student_id: new.student_id,
                        student_name: new.student_name,
                        assigned_admin: new.assigned_admin.unwrap_or_default(),
                        department: department_for(category),
                        timestamp: Utc::now(),
                        messages: Vec::new(),
                        attachments: Vec::new(),
                        version: 1,
                    };
                    let seq = self.insert_seq.fetch_add(1, Ordering::AcqRel);
                    vac.insert(CaseRecord {
                        seq,
                        case: case.clone(),
                    });
                    tracing::info!(
                        "Case {} filed by {} ({}, {})",
                        case.id,
                        case.student_id,
                        case.department,
                        case.priority
                    );
                    return Ok(case);
                }
            }
        }
    }

    // Applies `f` to a draft under the entry lock; commits and bumps the
    // version only if `f` succeeds.
    fn mutate<F>(&self, id: &str, expected_version: Option<u64>, f: F) -> Result<Case>
    where
        F: FnOnce(&mut Case) -> Result<()>,
    {
        let mut record = self.cases.get_mut(id).ok_or_else(|| {
            tracing::warn!("Case not found: {}", id);
            DeskError::NotFound(format!("case {}", id))
        })?;

        if let Some(expected) = expected_version {
            if record.case.version != expected {
                return Err(DeskError::Conflict(format!(
                    "case {} is at version {}, expected {}",
                    id, record.case.version, expected
                )));
            }
        }

        let mut draft = record.case.clone();
        f(&mut draft)?;
        draft.version += 1;
        record.case = draft.clone();
        Ok(draft)
    }

    /// Append one thread entry. The thread is append-only.
    pub fn append_message(
        &self,
        case_id: &str,
        sender: &str,
        text: &str,
        expected_version: Option<u64>,
    ) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DeskError::Validation("message text is required".to_string()));
        }
        let msg = Message {
            sender: sender.to_string(),
            text: text.to_string(),
            time: clock_time(),
        };
        let pushed = msg.clone();
        self.mutate(case_id, expected_version, move |c| {
            c.messages.push(pushed);
            Ok(())
        })?;
        tracing::debug!("Message appended to {} by {}", case_id, sender);
        Ok(msg)
    }

    pub fn set_status(
        &self,
        case_id: &str,
        status: Status,
        expected_version: Option<u64>,
    ) -> Result<Case> {
        let updated = self.mutate(case_id, expected_version, |c| transition(c, status))?;
        tracing::info!("Case {} status -> {}", case_id, status);
        Ok(updated)
    }

    /// Priority can be changed on any live case. Resolved cases are frozen
    /// and escalated cases stay Critical.
    pub fn set_priority(
        &self,
        case_id: &str,
        priority: Priority,
        expected_version: Option<u64>,
    ) -> Result<Case> {
        let updated = self.mutate(case_id, expected_version, |c| {
            if c.status.is_terminal() {
                return Err(DeskError::InvalidTransition(format!(
                    "case {} is resolved",
                    c.id
                )));
            }
            if c.status == Status::Escalated && priority != Priority::Critical {
                return Err(DeskError::InvalidTransition(format!(
                    "case {} is escalated and must stay {}",
                    c.id,
                    Priority::Critical
                )));
            }
            c.priority = priority;
            Ok(())
        })?;
        tracing::info!("Case {} priority -> {}", case_id, priority);
        Ok(updated)
    }

    /// Status change that must carry a remark; the remark lands in the
    /// thread as `[Status: <label>] <remark>` in the same locked section.
    pub fn change_status_with_remark(
        &self,
        case_id: &str,
        status: Status,
        sender: &str,
        remark: &str,
        expected_version: Option<u64>,
    ) -> Result<Case> {
        let remark = remark.trim();
        if remark.is_empty() {
            return Err(DeskError::Validation("a remark is required".to_string()));
        }
        let entry = Message {
            sender: sender.to_string(),
            text: format!("[Status: {}] {}", status, remark),
            time: clock_time(),
        };
        let updated = self.mutate(case_id, expected_version, move |c| {
            transition(c, status)?;
            c.messages.push(entry);
            Ok(())
        })?;
        tracing::info!("Case {} status -> {} with remark", case_id, status);
        Ok(updated)
    }

    /// Escalated + Critical together, or neither.
    pub fn escalate(&self, case_id: &str, expected_version: Option<u64>) -> Result<Case> {
        let updated = self.mutate(case_id, expected_version, |c| {
            transition(c, Status::Escalated)
        })?;
        tracing::info!("Case {} escalated", case_id);
        Ok(updated)
    }

    pub fn resolve(&self, case_id: &str, expected_version: Option<u64>) -> Result<Case> {
        self.set_status(case_id, Status::Resolved, expected_version)
    }
}

fn transition(c: &mut Case, next: Status) -> Result<()> {
    if !c.status.can_transition_to(next) {
        tracing::warn!("Rejected transition on {}: {} -> {}", c.id, c.status, next);
        return Err(DeskError::InvalidTransition(format!(
            "case {} cannot move from {} to {}",
            c.id, c.status, next
        )));
    }
    c.status = next;
    // Every route into Escalated carries Critical with it.
    if next == Status::Escalated {
        c.priority = Priority::Critical;
    }
    Ok(())
}

/// Local `hh:mm AM` display time for thread entries.
pub fn clock_time() -> String {
    Local::now().format("%I:%M %p").to_string()
}

// ── Confirmations ────────────────────────────────────────────────────────────
// Resolve and admin-delete are two-step: request returns a token, `take`
// consumes it exactly once (confirm or cancel). Tokens lapse after the
// configured ttl; a repeated request replaces the requester's earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    ResolveCase { case_id: String },
    DeleteAdmin { admin_id: String },
}

#[derive(Debug, Clone)]
pub struct Pending {
    pub action: PendingAction,
    /// Identity id of the requester; only they may confirm.
    pub requested_by: String,
    pub created_at: Instant,
}

impl Pending {
    fn expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

#[derive(Clone)]
pub struct ConfirmationBook {
    pending: Arc<DashMap<String, Pending>>,
    ttl: Duration,
}

impl Default for ConfirmationBook {
    fn default() -> Self {
        Self::new(DeskConfig::default().confirmation_ttl)
    }
}

impl ConfirmationBook {
    pub fn new(ttl: Duration) -> Self {
        ConfirmationBook {
            pending: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn request(&self, action: PendingAction, requested_by: &str) -> String {
        self.pending.retain(|_, p| {
            !(p.expired(self.ttl) || (p.requested_by == requested_by && p.action == action))
        });
        let token = Uuid::new_v4().to_string();
        self.pending.insert(
            token.clone(),
            Pending {
                action,
                requested_by: requested_by.to_string(),
                created_at: Instant::now(),
            },
        );
        tracing::debug!("{} confirmations pending", self.len());
        token
    }

    /// Remove and return the pending action. A second call with the same
    /// token finds nothing.
    pub fn take(&self, token: &str, requested_by: &str) -> Result<PendingAction> {
        self.pending
            .retain(|key, p| key.as_str() == token || !p.expired(self.ttl));
        match self.pending.entry(token.to_string()) {
            Entry::Occupied(occ) => {
                if occ.get().expired(self.ttl) {
                    occ.remove();
                    tracing::warn!("Confirmation {} expired", token);
                    return Err(DeskError::NotFound(format!(
                        "confirmation {} has expired",
                        token
                    )));
                }
                if occ.get().requested_by != requested_by {
                    return Err(DeskError::Authorization(
                        "confirmation belongs to another session".to_string(),
                    ));
                }
                Ok(occ.remove().action)
            }
            Entry::Vacant(_) => Err(DeskError::NotFound(format!("confirmation {}", token))),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

// ── Desk ─────────────────────────────────────────────────────────────────────
// Constructed once in main and handed to every request through an axum
// Extension. Clones share the same maps.
#[derive(Clone)]
pub struct Desk {
    pub cases: CaseStore,
    pub directory: Directory,
    pub confirmations: ConfirmationBook,
    pub config: Arc<DeskConfig>,
}

impl Desk {
    pub fn new(config: DeskConfig) -> Result<Self> {
        let desk = Desk {
            cases: CaseStore::new(),
            directory: Directory::new(config.bcrypt_cost),
            confirmations: ConfirmationBook::new(config.confirmation_ttl),
            config: Arc::new(config),
        };
        if desk.config.seed_demo_data {
            desk.directory.seed_demo()?;
            seed_demo_cases(&desk.cases)?;
            tracing::info!(
                "Seeded {} demo cases and {} identities",
                desk.cases.len(),
                desk.directory.len()
            );
        }
        Ok(desk)
    }
}

fn demo_timestamp(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn demo_message(sender: &str, text: &str, time: &str) -> Message {
    Message {
        sender: sender.to_string(),
        text: text.to_string(),
        time: time.to_string(),
    }
}

/// The three demo cases. Inserted oldest-listed last so `list_all` shows
/// G-1024, G-1085, G-1099 in that order.
pub fn seed_demo_cases(store: &CaseStore) -> Result<()> {
    let cases = vec![
        Case {
            id: "G-1099".into(),
            category: "Hostel".into(),
            subject: "Ragging complaint in Block A".into(),
            description: "Serious incident reported.".into(),
            status: Status::Escalated,
            priority: Priority::Critical,
            student_id: "U-9999".into(),
            student_name: "Anonymous".into(),
            assigned_admin: "Chief Warden".into(),
            department: "Hostel".into(),
            timestamp: demo_timestamp(2024, 10, 26, 12),
            messages: vec![],
            attachments: vec![],
            version: 1,
        },
        Case {
            id: "G-1085".into(),
            category: "Finance".into(),
            subject: "Exam Fee Discrepancy".into(),
            description: "I paid the fee but portal shows pending.".into(),
            status: Status::Open,
            priority: Priority::High,
            student_id: "U-1001".into(),
            student_name: "Demo Student".into(),
            assigned_admin: "Finance Officer".into(),
            department: "Finance".into(),
            timestamp: demo_timestamp(2024, 10, 25, 9),
            messages: vec![],
            attachments: vec![],
            version: 1,
        },
        Case {
            id: "G-1024".into(),
            category: "Hostel".into(),
            subject: "Water Cooler Leaking on 2nd Floor".into(),
            description: "The water cooler in Block A, 2nd floor has been leaking for 2 days. \
                          It's slippery and dangerous."
                .into(),
            status: Status::InProgress,
            priority: Priority::Critical,
            student_id: "U-1001".into(),
            student_name: "Demo Student".into(),
            assigned_admin: "Warden Smith".into(),
            department: "Hostel".into(),
            timestamp: demo_timestamp(2024, 10, 24, 10),
            messages: vec![
                demo_message("Student", "Is there any update? It's getting worse.", "10:45 AM"),
                demo_message("Admin", "Maintenance team dispatched.", "11:00 AM"),
            ],
            attachments: vec![],
            version: 1,
        },
    ];
    for case in cases {
        store.insert(case)?;
    }
    Ok(())
}
