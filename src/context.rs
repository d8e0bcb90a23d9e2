//! The persisted case document and its state transitions
use super::case::{CaseDetails, CaseStatus, RevealGrant, Response, TimeStamp};
use super::error::{CaseError, Result};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CaseContext {
    #[n(0)]
    pub id: String, // uuid7, bech32 with the case_ prefix
    #[n(1)]
    pub case_id: String, // human readable label, e.g. case-001
    #[n(2)]
    pub owner_user_id: String,
    #[n(3)]
    pub submitted_at: TimeStamp<Utc>,
    #[n(4)]
    pub details: CaseDetails,
    #[n(5)]
    pub status: CaseStatus,
    #[n(6)]
    pub responses: Vec<Response>,
    #[n(7)]
    pub user_revealed_to: Vec<RevealGrant>,
}

/// Result of a reveal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Granted,
    AlreadyGranted,
}

impl CaseContext {
    pub fn new(id: String, case_id: String, owner_user_id: String, details: CaseDetails) -> Self {
        Self {
            id,
            case_id,
            owner_user_id,
            submitted_at: TimeStamp::new(),
            details,
            status: CaseStatus::Submitted,
            responses: vec![],
            user_revealed_to: vec![],
        }
    }

    /// Status as implied by the responses on the case. `Closed` is sticky.
    pub fn current_state(&self) -> CaseStatus {
        if self.status == CaseStatus::Closed {
            return CaseStatus::Closed;
        }
        if self.responses.iter().any(|r| r.profile_revealed) {
            CaseStatus::ProfileRevealed
        } else if !self.responses.is_empty() {
            CaseStatus::Responded
        } else {
            CaseStatus::Submitted
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id
    }

    pub fn response_from(&self, advisor_id: &str) -> Option<&Response> {
        self.responses.iter().find(|r| r.advisor_id == advisor_id)
    }

    pub fn user_revealed_to(&self, advisor_id: &str) -> Option<&RevealGrant> {
        self.user_revealed_to
            .iter()
            .find(|g| g.advisor_id == advisor_id)
    }

    /// Appends a response. An advisor gets one response per case.
    pub fn insert_response(&mut self, response: Response) -> Result<()> {
        if self.response_from(&response.advisor_id).is_some() {
            return Err(CaseError::AlreadyResponded {
                case_id: self.case_id.clone(),
                advisor_id: response.advisor_id,
            });
        }
        self.responses.push(response);
        self.status = self.current_state();

        Ok(())
    }

    /// Flips `profile_revealed` on the advisor's response. Replays leave the
    /// original timestamp in place.
    pub fn reveal_advisor(&mut self, advisor_id: &str, at: TimeStamp<Utc>) -> Result<RevealOutcome> {
        let Some(response) = self
            .responses
            .iter_mut()
            .find(|r| r.advisor_id == advisor_id)
        else {
            return Err(CaseError::not_found(format!(
                "response from advisor {advisor_id} on case {}",
                self.case_id
            )));
        };

        if response.profile_revealed {
            return Ok(RevealOutcome::AlreadyGranted);
        }
        response.profile_revealed = true;
        response.profile_revealed_at = Some(at);
        self.status = self.current_state();

        Ok(RevealOutcome::Granted)
    }

    /// Grants the advisor the owner's identity. Never touches `status`.
    pub fn reveal_user(&mut self, advisor_id: &str, at: TimeStamp<Utc>) -> RevealOutcome {
        if self.user_revealed_to(advisor_id).is_some() {
            return RevealOutcome::AlreadyGranted;
        }
        self.user_revealed_to.push(RevealGrant {
            advisor_id: advisor_id.to_string(),
            revealed_at: at,
        });

        RevealOutcome::Granted
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(minicbor::decode(bytes)?)
    }

    pub fn load_from_tree(tree: &sled::Tree, id: &str) -> Result<Self> {
        match tree.get(id.as_bytes())? {
            Some(bytes) => Self::decode(&bytes),
            None => Err(CaseError::not_found(format!("case {id}"))),
        }
    }

    pub fn save_to_tree(&self, tree: &sled::Tree) -> Result<()> {
        tree.insert(self.id.as_bytes(), self.encode()?)?;
        Ok(())
    }
}
