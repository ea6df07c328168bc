use crate::error::{DeskError, Result};
use crate::models::{Identity, Role};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const IDENTITY_ID_PREFIX: &str = "U-";
const MIN_PASSWORD_LEN: usize = 6;

// ── Account (stored in DashMap) ──────────────────────────────────────────────
// The bcrypt hash lives beside the identity and never leaves this module.
#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub department: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

// ── Directory ────────────────────────────────────────────────────────────────
// Identities, credentials and sessions. Admin accounts are ordinary
// identities with role admin, so superadmin edits are visible to login.
#[derive(Clone)]
pub struct Directory {
    accounts: Arc<DashMap<String, Account>>, // identity id → account
    emails: Arc<DashMap<String, String>>,    // normalized email → identity id
    sessions: Arc<DashMap<String, String>>,  // session token → identity id
    next_number: Arc<AtomicU64>,
    bcrypt_cost: u32,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn required(value: &str, field: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(DeskError::Validation(format!("{} is required", field)));
    }
    Ok(v.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// All fields present, new matches confirm, minimum length.
pub fn validate_new_password(new: &str, confirm: &str) -> Result<()> {
    if new.is_empty() || confirm.is_empty() {
        return Err(DeskError::Validation("Please fill all fields".to_string()));
    }
    if new != confirm {
        return Err(DeskError::Validation("Passwords do not match".to_string()));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(DeskError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

impl Directory {
    pub fn new(bcrypt_cost: u32) -> Self {
        Directory {
            accounts: Arc::new(DashMap::new()),
            emails: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            next_number: Arc::new(AtomicU64::new(1000)),
            bcrypt_cost,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn get(&self, id: &str) -> Option<Identity> {
        self.accounts.get(id).map(|a| a.identity.clone())
    }

    fn next_id(&self) -> String {
        loop {
            let id = format!(
                "{}{}",
                IDENTITY_ID_PREFIX,
                self.next_number.fetch_add(1, Ordering::AcqRel)
            );
            if !self.accounts.contains_key(&id) {
                return id;
            }
        }
    }

    // Email uniqueness is claimed through the emails entry before the
    // account is written, so two registrations cannot share an address.
    fn insert_account(&self, identity: Identity, password: &str) -> Result<Identity> {
        let password_hash = bcrypt::hash(password, self.bcrypt_cost)?;
        match self.emails.entry(normalize_email(&identity.email)) {
            Entry::Occupied(_) => Err(DeskError::Conflict("Email already exists".to_string())),
            Entry::Vacant(vac) => {
                if let Some(n) = identity
                    .id
                    .strip_prefix(IDENTITY_ID_PREFIX)
                    .and_then(|n| n.parse::<u64>().ok())
                {
                    self.next_number.fetch_max(n + 1, Ordering::AcqRel);
                }
                vac.insert(identity.id.clone());
                self.accounts.insert(
                    identity.id.clone(),
                    Account {
                        identity: identity.clone(),
                        password_hash,
                    },
                );
                Ok(identity)
            }
        }
    }

    /// Demo identities. Their "demo" password predates the length rule and
    /// is inserted directly.
    pub fn seed_demo(&self) -> Result<()> {
        let demo = [
            Identity {
                id: "U-1001".into(),
                name: "Demo Student".into(),
                email: "student@demo.com".into(),
                role: Role::Student,
                department: Some("Computer Science".into()),
                phone: Some("+91 98765 43210".into()),
            },
            Identity {
                id: "U-2001".into(),
                name: "Warden Smith".into(),
                email: "admin@demo.com".into(),
                role: Role::Admin,
                department: Some("Hostel".into()),
                phone: None,
            },
            Identity {
                id: "U-3001".into(),
                name: "Dr. A. Sharma".into(),
                email: "super@demo.com".into(),
                role: Role::Superadmin,
                department: None,
                phone: None,
            },
        ];
        for identity in demo {
            self.insert_account(identity, "demo")?;
        }
        Ok(())
    }

    fn find_by_email(&self, email: &str) -> Option<Account> {
        let id = self.emails.get(&normalize_email(email))?.value().clone();
        self.accounts.get(&id).map(|a| a.value().clone())
    }

    /// Credential check without the simulated delay or a session.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
        let invalid = || DeskError::Authentication("Invalid credentials".to_string());
        let account = self.find_by_email(email).ok_or_else(invalid)?;
        if !bcrypt::verify(password, &account.password_hash).unwrap_or(false) {
            return Err(invalid());
        }
        Ok(account.identity)
    }

    fn open_session(&self, identity: Identity) -> Session {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), identity.id.clone());
        Session {
            token,
            user: identity,
        }
    }

    /// Simulated login round trip: waits `delay`, then resolves once.
    pub async fn login(&self, email: &str, password: &str, delay: Duration) -> Result<Session> {
        tokio::time::sleep(delay).await;
        match self.authenticate(email, password) {
            Ok(identity) => {
                tracing::info!("Login: {} ({})", identity.id, identity.role.as_str());
                Ok(self.open_session(identity))
            }
            Err(e) => {
                tracing::debug!("Login rejected for {}", email);
                Err(e)
            }
        }
    }

    /// Registration always creates a student and logs them in.
    pub async fn register(&self, req: RegisterRequest, delay: Duration) -> Result<Session> {
        tokio::time::sleep(delay).await;
        let name = required(&req.name, "name")?;
        let email = required(&req.email, "email")?;
        let confirm = req.confirm_password.as_deref().unwrap_or(&req.password);
        validate_new_password(&req.password, confirm)?;

        let identity = Identity {
            id: self.next_id(),
            name,
            email,
            role: Role::Student,
            department: non_blank(req.department),
            phone: non_blank(req.phone),
        };
        let identity = self.insert_account(identity, &req.password)?;
        tracing::info!("Registered student {}", identity.id);
        Ok(self.open_session(identity))
    }

    /// Drop the session. Returns whether one existed.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn current_user(&self, token: &str) -> Option<Identity> {
        let id = self.sessions.get(token)?.value().clone();
        self.get(&id)
    }

    /// Session guard: the token must be live and its identity must hold `role`.
    pub fn require(&self, token: Option<&str>, role: Role) -> Result<Identity> {
        self.require_any(token, &[role])
    }

    /// Like `require`, for tools shared by several roles.
    pub fn require_any(&self, token: Option<&str>, roles: &[Role]) -> Result<Identity> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DeskError::Authentication("Missing session".to_string()))?;
        let user = self
            .current_user(token)
            .ok_or_else(|| DeskError::Authentication("Unknown or expired session".to_string()))?;
        if !roles.contains(&user.role) {
            let needed: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            tracing::warn!(
                "Role mismatch: {} is {}, tool needs {}",
                user.id,
                user.role.as_str(),
                needed.join(" or ")
            );
            return Err(DeskError::Authorization(format!(
                "{} sessions belong on {}",
                user.role.as_str(),
                user.role.landing_page()
            )));
        }
        Ok(user)
    }

    pub fn change_password(
        &self,
        identity_id: &str,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<()> {
        if current.is_empty() {
            return Err(DeskError::Validation("Please fill all fields".to_string()));
        }
        validate_new_password(new, confirm)?;
        let new_hash = bcrypt::hash(new, self.bcrypt_cost)?;
        let mut account = self
            .accounts
            .get_mut(identity_id)
            .ok_or_else(|| DeskError::NotFound(format!("identity {}", identity_id)))?;
        if !bcrypt::verify(current, &account.password_hash).unwrap_or(false) {
            return Err(DeskError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }
        account.password_hash = new_hash;
        tracing::info!("Password changed for {}", identity_id);
        Ok(())
    }

    // ── Admin accounts ──────────────────────────────────────────────────────

    pub fn list_admins(&self) -> Vec<Identity> {
        let mut admins: Vec<Identity> = self
            .accounts
            .iter()
            .filter(|a| a.identity.role == Role::Admin)
            .map(|a| a.identity.clone())
            .collect();
        admins.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        admins
    }

    pub fn create_admin(&self, new: NewAdmin) -> Result<Identity> {
        let name = required(&new.name, "name")?;
        let email = required(&new.email, "email")?;
        validate_new_password(&new.password, &new.password)?;
        let identity = Identity {
            id: self.next_id(),
            name,
            email,
            role: Role::Admin,
            department: non_blank(new.department),
            phone: None,
        };
        let identity = self.insert_account(identity, &new.password)?;
        tracing::info!(
            "Admin {} created for {}",
            identity.id,
            identity.department.as_deref().unwrap_or("no department")
        );
        Ok(identity)
    }

    fn admin_account_exists(&self, id: &str) -> Result<()> {
        match self.accounts.get(id) {
            Some(a) if a.identity.role == Role::Admin => Ok(()),
            _ => {
                tracing::warn!("Admin not found: {}", id);
                Err(DeskError::NotFound(format!("admin {}", id)))
            }
        }
    }

    pub fn update_admin(&self, id: &str, update: AdminUpdate) -> Result<Identity> {
        self.admin_account_exists(id)?;
        // Claim the new address first; a taken address aborts before the
        // account is touched.
        let moved = match non_blank(update.email.clone()) {
            Some(new_email) => self.claim_email(id, &new_email)?,
            None => None,
        };
        self.apply_admin_update(id, update, moved)
    }

    /// Point `new_email` at `id`. Returns the (new, old) index keys when the
    /// address actually changes.
    fn claim_email(&self, id: &str, new_email: &str) -> Result<Option<(String, String)>> {
        let old_key = self
            .get(id)
            .map(|i| normalize_email(&i.email))
            .unwrap_or_default();
        let new_key = normalize_email(new_email);
        if new_key == old_key {
            return Ok(None);
        }
        match self.emails.entry(new_key.clone()) {
            Entry::Occupied(_) => Err(DeskError::Conflict("Email already exists".to_string())),
            Entry::Vacant(vac) => {
                vac.insert(id.to_string());
                Ok(Some((new_key, old_key)))
            }
        }
    }

    fn apply_admin_update(
        &self,
        id: &str,
        update: AdminUpdate,
        moved: Option<(String, String)>,
    ) -> Result<Identity> {
        let Some(mut account) = self.accounts.get_mut(id) else {
            // Deleted since the claim; give the address back.
            if let Some((new_key, _)) = moved {
                self.emails.remove_if(&new_key, |_, owner| owner.as_str() == id);
            }
            tracing::warn!("Admin {} vanished during update", id);
            return Err(DeskError::NotFound(format!("admin {}", id)));
        };
        if let Some((_, old_key)) = moved {
            self.emails.remove_if(&old_key, |_, owner| owner.as_str() == id);
        }
        if let Some(name) = non_blank(update.name) {
            account.identity.name = name;
        }
        if let Some(department) = non_blank(update.department) {
            account.identity.department = Some(department);
        }
        if let Some(email) = non_blank(update.email) {
            account.identity.email = email;
        }
        tracing::info!("Admin {} updated", id);
        Ok(account.identity.clone())
    }

    /// Remove an admin account, its email claim and any open sessions.
    pub fn delete_admin(&self, id: &str) -> Result<Identity> {
        self.admin_account_exists(id)?;
        let (_, account) = self
            .accounts
            .remove(id)
            .ok_or_else(|| DeskError::NotFound(format!("admin {}", id)))?;
        self.emails.remove(&normalize_email(&account.identity.email));
        self.sessions.retain(|_, owner| owner.as_str() != id);
        tracing::info!("Admin {} removed", id);
        Ok(account.identity)
    }
}
