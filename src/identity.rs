//! Identity store: users, advisors and admins with their credentials
//!
//! Passwords are hashed with argon2id and stored as PHC strings. Emails are
//! unique across all roles; the `principal_emails` tree maps the normalised
//! address to the principal id and is claimed with a compare-and-swap so two
//! registrations racing for one address cannot both succeed.

use super::case::TimeStamp;
use super::error::{CaseError, Result};
use super::utils;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[n(0)]
    User,
    #[n(1)]
    Advisor,
    #[n(2)]
    Admin,
}

impl Role {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Role::User => utils::USER_HRP,
            Role::Advisor => utils::ADVISOR_HRP,
            Role::Admin => utils::ADMIN_HRP,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Advisor => write!(f, "advisor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Admin sign-off state for an advisor account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
}

/// Public facing advisor details.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorProfile {
    #[n(0)]
    pub name: String,
    #[n(1)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firm: Option<String>,
    #[n(2)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[n(3)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[n(4)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[n(5)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[n(6)]
    pub specialisms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PrincipalRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub role: Role,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub password_hash: String,
    #[n(4)]
    pub approval: Approval,
    #[n(5)]
    pub advisor_profile: Option<AdvisorProfile>,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl PrincipalRecord {
    pub fn is_approved(&self) -> bool {
        self.approval == Approval::Approved
    }
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CaseError::Internal(anyhow::anyhow!("failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| CaseError::Internal(anyhow::anyhow!("invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn check_new_credentials(email: &str, password: &str) -> Result<String> {
    let email = utils::normalise_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(CaseError::invalid("a valid email address is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CaseError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(email)
}

#[derive(Clone)]
pub struct IdentityStore {
    principals: sled::Tree,
    emails: sled::Tree,
}

impl IdentityStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            principals: db.open_tree("principals")?,
            emails: db.open_tree("principal_emails")?,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<PrincipalRecord>> {
        match self.principals.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, id: &str) -> Result<PrincipalRecord> {
        self.get(id)?
            .ok_or_else(|| CaseError::not_found(format!("principal {id}")))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>> {
        let email = utils::normalise_email(email);
        match self.emails.get(email.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    fn save(&self, record: &PrincipalRecord) -> Result<()> {
        self.principals
            .insert(record.id.as_bytes(), minicbor::to_vec(record)?)?;
        Ok(())
    }

    fn register(
        &self,
        role: Role,
        email: &str,
        password: &str,
        approval: Approval,
        advisor_profile: Option<AdvisorProfile>,
    ) -> Result<PrincipalRecord> {
        let email = check_new_credentials(email, password)?;
        let id = utils::new_uuid_to_bech32(role.id_prefix())?;

        let claimed = self.emails.compare_and_swap(
            email.as_bytes(),
            None as Option<&[u8]>,
            Some(id.as_bytes()),
        )?;
        if claimed.is_err() {
            return Err(CaseError::EmailTaken);
        }

        let record = PrincipalRecord {
            id,
            role,
            email,
            password_hash: hash_password(password)?,
            approval,
            advisor_profile,
            created_at: TimeStamp::new(),
        };
        self.save(&record)?;
        info!(principal_id = %record.id, role = %role, "principal registered");

        Ok(record)
    }

    pub fn register_user(&self, email: &str, password: &str) -> Result<PrincipalRecord> {
        self.register(Role::User, email, password, Approval::Approved, None)
    }

    /// New advisors wait for an admin before they can see cases.
    pub fn register_advisor(
        &self,
        email: &str,
        password: &str,
        profile: AdvisorProfile,
    ) -> Result<PrincipalRecord> {
        let name = profile.name.trim().to_string();
        if name.is_empty() {
            return Err(CaseError::invalid("advisor name is required"));
        }
        let profile = AdvisorProfile { name, ..profile };
        self.register(Role::Advisor, email, password, Approval::Pending, Some(profile))
    }

    /// Creates the admin account unless the address is already registered.
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<PrincipalRecord> {
        if let Some(existing) = self.find_by_email(email)? {
            if existing.role != Role::Admin {
                return Err(CaseError::EmailTaken);
            }
            return Ok(existing);
        }
        self.register(Role::Admin, email, password, Approval::Approved, None)
    }

    pub fn approve_advisor(&self, advisor_id: &str) -> Result<PrincipalRecord> {
        let mut record = self.require(advisor_id)?;
        if record.role != Role::Advisor {
            return Err(CaseError::invalid(format!("{advisor_id} is not an advisor")));
        }
        if !record.is_approved() {
            record.approval = Approval::Approved;
            self.save(&record)?;
            info!(advisor_id = %record.id, "advisor approved");
        }
        Ok(record)
    }

    pub fn pending_advisors(&self) -> Result<Vec<PrincipalRecord>> {
        let mut pending = vec![];
        for entry in self.principals.iter() {
            let (_, bytes) = entry?;
            let record: PrincipalRecord = minicbor::decode(&bytes)?;
            if record.role == Role::Advisor && !record.is_approved() {
                pending.push(record);
            }
        }
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    /// Checks email and password, the same error for either being wrong.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<PrincipalRecord> {
        let record = self.find_by_email(email)?.ok_or(CaseError::Credentials)?;
        if !verify_password(password, &record.password_hash)? {
            return Err(CaseError::Credentials);
        }
        Ok(record)
    }

    /// Used by case submission, which creates the user on first contact.
    pub fn find_or_register_user(&self, email: &str, password: &str) -> Result<PrincipalRecord> {
        match self.find_by_email(email)? {
            Some(_) => {
                let record = self.authenticate(email, password)?;
                if record.role != Role::User {
                    return Err(CaseError::unauthorized(
                        "only user accounts can submit cases",
                    ));
                }
                Ok(record)
            }
            None => self.register_user(email, password),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("identity.db")).unwrap();
        let store = IdentityStore::open(&db).unwrap();
        (dir, store)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_password("password", "not-a-valid-hash").is_err());
    }

    #[test]
    fn emails_are_unique_across_roles() {
        let (_dir, store) = store();
        store.register_user("sam@example.com", "password1").unwrap();

        let err = store
            .register_advisor(
                "SAM@example.com",
                "password1",
                AdvisorProfile {
                    name: "Sam".into(),
                    ..AdvisorProfile::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CaseError::EmailTaken));
    }

    #[test]
    fn short_passwords_are_rejected() {
        let (_dir, store) = store();

        assert!(matches!(
            store.register_user("sam@example.com", "short"),
            Err(CaseError::InvalidInput(_))
        ));
    }

    #[test]
    fn advisors_start_pending() {
        let (_dir, store) = store();
        let advisor = store
            .register_advisor(
                "ada@example.com",
                "password1",
                AdvisorProfile {
                    name: "Ada".into(),
                    ..AdvisorProfile::default()
                },
            )
            .unwrap();

        assert!(!advisor.is_approved());
        assert_eq!(store.pending_advisors().unwrap().len(), 1);

        store.approve_advisor(&advisor.id).unwrap();
        assert!(store.pending_advisors().unwrap().is_empty());
    }

    #[test]
    fn find_or_register_checks_existing_password() {
        let (_dir, store) = store();
        let created = store.find_or_register_user("jo@example.com", "password1").unwrap();
        let again = store.find_or_register_user("jo@example.com", "password1").unwrap();

        assert_eq!(created.id, again.id);
        assert!(matches!(
            store.find_or_register_user("jo@example.com", "password2"),
            Err(CaseError::Credentials)
        ));
    }
}
