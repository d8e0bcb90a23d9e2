//! Access gateway: who is calling, and may they do this
//!
//! Sessions are opaque bearer tokens. Only the sha256 digest of a token is
//! kept in the `sessions` tree, so a copy of the database does not hand out
//! live credentials.

use super::case::TimeStamp;
use super::error::{CaseError, Result};
use super::identity::{IdentityStore, PrincipalRecord, Role};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use tracing::debug;

const TOKEN_BYTES: usize = 32;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub approved: bool,
}

impl From<&PrincipalRecord> for Principal {
    fn from(record: &PrincipalRecord) -> Self {
        Self {
            id: record.id.clone(),
            role: record.role,
            approved: record.is_approved(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitCase,
    ListOwnCases,
    ListEligibleCases,
    GetCase,
    SubmitResponse,
    RevealAdvisor,
    RevealUser,
    ListPendingAdvisors,
    ApproveAdvisor,
}

impl Operation {
    /// The single role allowed to run the operation, `None` when any role may.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Operation::SubmitCase | Operation::ListOwnCases | Operation::RevealAdvisor => {
                Some(Role::User)
            }
            Operation::ListEligibleCases | Operation::SubmitResponse | Operation::RevealUser => {
                Some(Role::Advisor)
            }
            Operation::ListPendingAdvisors | Operation::ApproveAdvisor => Some(Role::Admin),
            Operation::GetCase => None,
        }
    }
}

/// Role guard in front of the engine. Advisors also need admin approval.
pub fn authorize(principal: &Principal, operation: Operation) -> Result<()> {
    if let Some(required) = operation.required_role() {
        if principal.role != required {
            return Err(CaseError::unauthorized(format!(
                "{:?} requires the {required} role",
                operation
            )));
        }
    }
    if principal.role == Role::Advisor && !principal.approved {
        return Err(CaseError::unauthorized("advisor account is awaiting approval"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
struct Session {
    #[n(0)]
    principal_id: String,
    #[n(1)]
    issued_at: TimeStamp<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: sled::Tree,
    ttl: Duration,
}

impl SessionStore {
    pub fn open(db: &sled::Db, ttl_hours: i64) -> Result<Self> {
        let ttl = Duration::try_hours(ttl_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| {
                CaseError::invalid(format!("session ttl of {ttl_hours} hours is out of range"))
            })?;

        Ok(Self {
            sessions: db.open_tree("sessions")?,
            ttl,
        })
    }

    pub fn issue(&self, record: &PrincipalRecord) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let session = Session {
            principal_id: record.id.clone(),
            issued_at: TimeStamp::new(),
        };
        self.sessions
            .insert(sha256::digest(token.as_str()).as_bytes(), minicbor::to_vec(&session)?)?;
        debug!(principal_id = %record.id, "session issued");

        Ok(token)
    }

    /// Looks the token up and rebuilds the principal from the live record.
    pub fn resolve(&self, token: &str, identities: &IdentityStore) -> Result<Principal> {
        let key = sha256::digest(token);
        let Some(bytes) = self.sessions.get(key.as_bytes())? else {
            return Err(CaseError::Unauthenticated);
        };
        let session: Session = minicbor::decode(&bytes)?;

        if Utc::now() - session.issued_at.to_datetime_utc() > self.ttl {
            self.sessions.remove(key.as_bytes())?;
            return Err(CaseError::Unauthenticated);
        }

        match identities.get(&session.principal_id)? {
            Some(record) => Ok(Principal::from(&record)),
            None => {
                self.sessions.remove(key.as_bytes())?;
                Err(CaseError::Unauthenticated)
            }
        }
    }

    pub fn revoke(&self, token: &str) -> Result<()> {
        self.sessions.remove(sha256::digest(token).as_bytes())?;
        Ok(())
    }
}
