//! Service layer API for the case lifecycle
use super::case::{CaseDetails, CaseStatus, Response, TimeStamp};
use super::config::{CaseConfig, Config};
use super::context::{CaseContext, RevealOutcome};
use super::error::{CaseError, Result};
use super::gateway::{Operation, Principal, SessionStore, authorize};
use super::identity::{AdvisorProfile, IdentityStore, PrincipalRecord, Role};
use super::projection::{AdvisorProfileView, CaseView, project};
use super::response::RespondInput;
use super::utils;
use serde::Serialize;
use sled::transaction::ConflictableTransactionError::Abort;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every status an advisor may browse.
pub const ELIGIBLE_STATUSES: [CaseStatus; 4] = [
    CaseStatus::Submitted,
    CaseStatus::Responded,
    CaseStatus::ProfileRevealed,
    CaseStatus::Closed,
];

const LABEL_ATTEMPTS: usize = 8;
const LABEL_SEQUENCE_KEY: &[u8] = b"case_label_seq";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedCase {
    pub id: String,
    pub case_id: String,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondOutcome {
    pub case_id: String,
    pub status: CaseStatus,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorReveal {
    pub status: CaseStatus,
    pub profile_revealed_at: TimeStamp<chrono::Utc>,
    pub advisor: AdvisorProfileView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReveal {
    pub case_id: String,
    pub email: String,
    pub revealed_at: TimeStamp<chrono::Utc>,
}

fn read_sequence(bytes: &[u8]) -> u64 {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}

fn increment(old: Option<&[u8]>) -> Option<Vec<u8>> {
    let number = old.map(read_sequence).unwrap_or_default() + 1;

    Some(number.to_be_bytes().to_vec())
}

#[derive(Clone)]
pub struct CaseService {
    instance: Arc<sled::Db>,
    cases: sled::Tree,
    labels: sled::Tree,
    meta: sled::Tree,
    identities: IdentityStore,
    sessions: SessionStore,
    labelling: CaseConfig,
}

impl CaseService {
    pub fn new(instance: Arc<sled::Db>, config: &Config) -> Result<Self> {
        Ok(Self {
            cases: instance.open_tree("cases")?,
            labels: instance.open_tree("case_labels")?,
            meta: instance.open_tree("meta")?,
            identities: IdentityStore::open(&instance)?,
            sessions: SessionStore::open(&instance, config.sessions.ttl_hours)?,
            labelling: config.cases.clone(),
            instance,
        })
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Load case context from database
    fn load_case_context(&self, key: &str) -> Result<CaseContext> {
        CaseContext::load_from_tree(&self.cases, key)
    }

    /// Accepts either the opaque id or the human readable label.
    fn resolve_case_key(&self, case_ref: &str) -> Result<String> {
        if utils::is_valid_id(case_ref, utils::CASE_HRP) {
            return Ok(case_ref.to_string());
        }
        let prefix = format!("{}-", self.labelling.label_prefix);
        if case_ref.starts_with(&prefix) {
            return match self.labels.get(case_ref.as_bytes())? {
                Some(id) => Ok(String::from_utf8_lossy(&id).into_owned()),
                None => Err(CaseError::not_found(format!("case {case_ref}"))),
            };
        }
        Err(CaseError::invalid(format!("{case_ref} is not a case id")))
    }

    fn check_advisor_id(advisor_id: &str) -> Result<()> {
        if utils::is_valid_id(advisor_id, utils::ADVISOR_HRP) {
            Ok(())
        } else {
            Err(CaseError::invalid(format!("{advisor_id} is not an advisor id")))
        }
    }

    /// Claims the next free label, falling back to a uuid suffix.
    fn claim_label(&self, id: &str) -> Result<String> {
        let prefix = &self.labelling.label_prefix;
        let width = self.labelling.label_width;

        for _ in 0..LABEL_ATTEMPTS {
            let Some(seq) = self.meta.update_and_fetch(LABEL_SEQUENCE_KEY, increment)? else {
                continue;
            };
            let label = format!("{prefix}-{:0width$}", read_sequence(&seq));

            let claimed = self.labels.compare_and_swap(
                label.as_bytes(),
                None as Option<&[u8]>,
                Some(id.as_bytes()),
            )?;
            if claimed.is_ok() {
                return Ok(label);
            }
            warn!(label = %label, "case label already taken, trying the next one");
        }

        let suffix = hex::encode(&uuid7::uuid7().as_bytes()[10..]);
        let label = format!("{prefix}-{suffix}");
        let claimed = self.labels.compare_and_swap(
            label.as_bytes(),
            None as Option<&[u8]>,
            Some(id.as_bytes()),
        )?;
        if claimed.is_err() {
            return Err(CaseError::Internal(anyhow::anyhow!(
                "could not allocate a case label"
            )));
        }
        Ok(label)
    }

    /// Submit a new case on behalf of an authenticated user
    pub fn submit_case(&self, principal: &Principal, details: CaseDetails) -> Result<SubmittedCase> {
        authorize(principal, Operation::SubmitCase)?;
        let details = details.validate_and_finalise()?;

        let id = utils::new_uuid_to_bech32(utils::CASE_HRP)?;
        let label = self.claim_label(&id)?;
        let case_context = CaseContext::new(id, label, principal.id.clone(), details);
        case_context.save_to_tree(&self.cases)?;

        info!(case_id = %case_context.case_id, user_id = %principal.id, "case submitted");

        Ok(SubmittedCase {
            id: case_context.id,
            case_id: case_context.case_id,
            status: case_context.status,
        })
    }

    /// Submit a case with credentials, creating the user on first contact.
    /// Returns a session token alongside the case.
    pub fn submit_case_with_credentials(
        &self,
        email: &str,
        password: &str,
        details: CaseDetails,
    ) -> Result<(SubmittedCase, String)> {
        // validate before creating an account for a case that would be rejected
        let details = details.validate_and_finalise()?;
        let record = self.identities.find_or_register_user(email, password)?;
        let submitted = self.submit_case(&Principal::from(&record), details)?;
        let token = self.sessions.issue(&record)?;

        Ok((submitted, token))
    }

    fn all_cases(&self) -> Result<Vec<CaseContext>> {
        let mut cases = vec![];
        for entry in self.cases.iter() {
            let (_, bytes) = entry?;
            cases.push(CaseContext::decode(&bytes)?);
        }
        // newest first
        cases.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(cases)
    }

    /// Cases an advisor may browse, projected for that advisor
    pub fn list_eligible_cases(&self, principal: &Principal) -> Result<Vec<CaseView>> {
        authorize(principal, Operation::ListEligibleCases)?;

        self.all_cases()?
            .iter()
            .filter(|case| ELIGIBLE_STATUSES.contains(&case.status))
            .map(|case| project(case, principal, &self.identities))
            .collect()
    }

    /// The calling user's own cases
    pub fn list_own_cases(&self, principal: &Principal) -> Result<Vec<CaseView>> {
        authorize(principal, Operation::ListOwnCases)?;

        self.all_cases()?
            .iter()
            .filter(|case| case.is_owned_by(&principal.id))
            .map(|case| project(case, principal, &self.identities))
            .collect()
    }

    pub fn get_case(&self, principal: &Principal, case_ref: &str) -> Result<CaseView> {
        authorize(principal, Operation::GetCase)?;
        let key = self.resolve_case_key(case_ref)?;
        let case_context = self.load_case_context(&key)?;

        if principal.role == Role::User && !case_context.is_owned_by(&principal.id) {
            return Err(CaseError::unauthorized("case belongs to another user"));
        }

        project(&case_context, principal, &self.identities)
    }

    /// Add an advisor's response. The duplicate check and the append run in
    /// one transaction, so racing submissions from one advisor store one
    /// response.
    pub fn submit_response(
        &self,
        principal: &Principal,
        case_ref: &str,
        input: RespondInput,
    ) -> Result<RespondOutcome> {
        authorize(principal, Operation::SubmitResponse)?;
        let key = self.resolve_case_key(case_ref)?;
        let validated = input.validate()?;

        let advisor = self.identities.require(&principal.id)?;
        let profile = advisor.advisor_profile.unwrap_or_default();
        let submitted_at = TimeStamp::new();

        let result = self.cases.transaction(|tx| {
            let Some(bytes) = tx.get(key.as_bytes())? else {
                return Err(Abort(CaseError::not_found(format!("case {case_ref}"))));
            };
            let mut case_context = CaseContext::decode(&bytes).map_err(Abort)?;

            let response = Response::new(
                principal.id.clone(),
                profile.name.clone(),
                profile.firm.clone(),
                validated.body.clone(),
                validated.sections.clone(),
                submitted_at.clone(),
            );
            case_context.insert_response(response).map_err(Abort)?;

            tx.insert(key.as_bytes(), case_context.encode().map_err(Abort)?)?;
            Ok(case_context)
        });

        let case_context = result.map_err(CaseError::from).inspect_err(|err| {
            if let CaseError::AlreadyResponded { .. } = err {
                warn!(case = %case_ref, advisor_id = %principal.id, "duplicate response rejected");
            }
        })?;

        info!(
            case_id = %case_context.case_id,
            advisor_id = %principal.id,
            status = %case_context.status,
            "response recorded"
        );

        Ok(RespondOutcome {
            case_id: case_context.case_id,
            status: case_context.status,
            response: validated.body,
        })
    }

    /// The owner reveals one advisor's identity. Replays return the original
    /// reveal without touching the document.
    pub fn reveal_advisor(
        &self,
        principal: &Principal,
        case_ref: &str,
        advisor_id: &str,
    ) -> Result<AdvisorReveal> {
        authorize(principal, Operation::RevealAdvisor)?;
        let key = self.resolve_case_key(case_ref)?;
        Self::check_advisor_id(advisor_id)?;

        // the owner never changes, a plain read is enough for the check
        if !self.load_case_context(&key)?.is_owned_by(&principal.id) {
            return Err(CaseError::unauthorized("case belongs to another user"));
        }

        let revealed_at = TimeStamp::new();
        let (case_context, outcome) = self
            .cases
            .transaction(|tx| {
                let Some(bytes) = tx.get(key.as_bytes())? else {
                    return Err(Abort(CaseError::not_found(format!("case {case_ref}"))));
                };
                let mut case_context = CaseContext::decode(&bytes).map_err(Abort)?;

                let outcome = case_context
                    .reveal_advisor(advisor_id, revealed_at.clone())
                    .map_err(Abort)?;
                if outcome == RevealOutcome::Granted {
                    tx.insert(key.as_bytes(), case_context.encode().map_err(Abort)?)?;
                }
                Ok((case_context, outcome))
            })
            .map_err(CaseError::from)?;

        match outcome {
            RevealOutcome::Granted => info!(
                case_id = %case_context.case_id,
                advisor_id = %advisor_id,
                "advisor profile revealed to owner"
            ),
            RevealOutcome::AlreadyGranted => debug!(
                case_id = %case_context.case_id,
                advisor_id = %advisor_id,
                "advisor profile already revealed"
            ),
        }

        let Some(response) = case_context.response_from(advisor_id) else {
            return Err(CaseError::not_found(format!("response from advisor {advisor_id}")));
        };
        let live = self.identities.get(advisor_id)?;

        Ok(AdvisorReveal {
            status: case_context.status,
            profile_revealed_at: response
                .profile_revealed_at
                .clone()
                .unwrap_or(revealed_at),
            advisor: AdvisorProfileView::build(response, live.as_ref()),
        })
    }

    /// An advisor asks for the owner's identity. Any approved advisor may ask,
    /// whether or not they have responded.
    pub fn reveal_user(&self, principal: &Principal, case_ref: &str) -> Result<UserReveal> {
        authorize(principal, Operation::RevealUser)?;
        let key = self.resolve_case_key(case_ref)?;

        let existing = self.load_case_context(&key)?;
        let owner = self
            .identities
            .get(&existing.owner_user_id)?
            .ok_or_else(|| CaseError::not_found(format!("owner of case {case_ref}")))?;
        if existing.response_from(&principal.id).is_none() {
            debug!(
                case_id = %existing.case_id,
                advisor_id = %principal.id,
                "user reveal requested before responding"
            );
        }

        let revealed_at = TimeStamp::new();
        let (case_context, outcome) = self
            .cases
            .transaction(|tx| {
                let Some(bytes) = tx.get(key.as_bytes())? else {
                    return Err(Abort(CaseError::not_found(format!("case {case_ref}"))));
                };
                let mut case_context = CaseContext::decode(&bytes).map_err(Abort)?;

                let outcome = case_context.reveal_user(&principal.id, revealed_at.clone());
                if outcome == RevealOutcome::Granted {
                    tx.insert(key.as_bytes(), case_context.encode().map_err(Abort)?)?;
                }
                Ok((case_context, outcome))
            })
            .map_err(CaseError::from)?;

        match outcome {
            RevealOutcome::Granted => info!(
                case_id = %case_context.case_id,
                advisor_id = %principal.id,
                "user identity revealed to advisor"
            ),
            RevealOutcome::AlreadyGranted => debug!(
                case_id = %case_context.case_id,
                advisor_id = %principal.id,
                "user identity already revealed"
            ),
        }

        let granted_at = case_context
            .user_revealed_to(&principal.id)
            .map(|g| g.revealed_at.clone())
            .unwrap_or(revealed_at);

        Ok(UserReveal {
            case_id: case_context.case_id,
            email: owner.email,
            revealed_at: granted_at,
        })
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(PrincipalRecord, String)> {
        let record = self.identities.authenticate(email, password)?;
        let token = self.sessions.issue(&record)?;
        Ok((record, token))
    }

    pub fn logout(&self, token: &str) -> Result<()> {
        self.sessions.revoke(token)
    }

    pub fn authenticate_token(&self, token: &str) -> Result<Principal> {
        self.sessions.resolve(token, &self.identities)
    }

    pub fn register_advisor(
        &self,
        email: &str,
        password: &str,
        profile: AdvisorProfile,
    ) -> Result<PrincipalRecord> {
        self.identities.register_advisor(email, password, profile)
    }

    pub fn list_pending_advisors(&self, principal: &Principal) -> Result<Vec<PrincipalRecord>> {
        authorize(principal, Operation::ListPendingAdvisors)?;
        self.identities.pending_advisors()
    }

    pub fn approve_advisor(&self, principal: &Principal, advisor_id: &str) -> Result<PrincipalRecord> {
        authorize(principal, Operation::ApproveAdvisor)?;
        Self::check_advisor_id(advisor_id)?;
        self.identities.approve_advisor(advisor_id)
    }

    /// Creates the configured admin account if it is missing.
    pub fn bootstrap_admin(&self, email: &str, password: &str) -> Result<PrincipalRecord> {
        let admin = self.identities.ensure_admin(email, password)?;
        info!(admin_id = %admin.id, "admin account ready");
        Ok(admin)
    }
}
