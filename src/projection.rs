//! Role dependent view of a case
//!
//! What a reader gets back depends on who they are and on the reveal state of
//! the case:
//!
//! - admins see every advisor's identity and profile plus the owner's email
//! - the owning user sees an advisor's identity only once that response has
//!   been revealed, and sees the grants they have made
//! - advisors see each other's name, firm and email, but the owner's email only
//!   when they personally hold a reveal grant
//!
//! Fields a reader may not see are left out of the payload entirely.

use super::case::{CaseDetails, CaseStatus, ResponseSections, Response, RevealGrant, TimeStamp};
use super::context::CaseContext;
use super::error::Result;
use super::gateway::Principal;
use super::identity::{IdentityStore, PrincipalRecord, Role};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

/// Where projection looks up live principal records.
pub trait Directory {
    fn principal(&self, id: &str) -> Result<Option<PrincipalRecord>>;
}

impl Directory for IdentityStore {
    fn principal(&self, id: &str) -> Result<Option<PrincipalRecord>> {
        self.get(id)
    }
}

impl Directory for HashMap<String, PrincipalRecord> {
    fn principal(&self, id: &str) -> Result<Option<PrincipalRecord>> {
        Ok(self.get(id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorProfileView {
    pub advisor_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specialisms: Vec<String>,
}

impl AdvisorProfileView {
    /// Prefers the live advisor record, falling back to the snapshot taken
    /// when the response was written.
    pub fn build(response: &Response, live: Option<&PrincipalRecord>) -> Self {
        match live.and_then(|r| r.advisor_profile.as_ref().map(|p| (r, p))) {
            Some((record, profile)) => Self {
                advisor_id: response.advisor_id.clone(),
                name: profile.name.clone(),
                firm: profile.firm.clone(),
                email: Some(record.email.clone()),
                title: profile.title.clone(),
                bio: profile.bio.clone(),
                location: profile.location.clone(),
                website: profile.website.clone(),
                specialisms: profile.specialisms.clone(),
            },
            None => Self {
                advisor_id: response.advisor_id.clone(),
                name: response.advisor_name.clone(),
                firm: response.advisor_firm.clone(),
                email: None,
                title: None,
                bio: None,
                location: None,
                website: None,
                specialisms: vec![],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub advisor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_firm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_profile: Option<AdvisorProfileView>,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_sections: Option<ResponseSections>,
    pub submitted_at: TimeStamp<Utc>,
    pub profile_revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_revealed_at: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseView {
    pub id: String,
    pub case_id: String,
    pub status: CaseStatus,
    pub submitted_at: TimeStamp<Utc>,
    #[serde(flatten)]
    pub details: CaseDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    pub responses: Vec<ResponseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_revealed_to: Option<Vec<RevealGrant>>,
}

// how much of an advisor's identity goes into one response view
enum Exposure {
    Hidden,
    Identity,
    Full,
}

fn response_view(response: &Response, exposure: Exposure, live: Option<&PrincipalRecord>) -> ResponseView {
    let mut view = ResponseView {
        advisor_id: response.advisor_id.clone(),
        advisor_name: None,
        advisor_firm: None,
        advisor_email: None,
        advisor_profile: None,
        response: response.response.clone(),
        response_sections: response.response_sections.clone(),
        submitted_at: response.submitted_at.clone(),
        profile_revealed: response.profile_revealed,
        profile_revealed_at: response.profile_revealed_at.clone(),
    };

    if let Exposure::Hidden = exposure {
        return view;
    }
    let card = AdvisorProfileView::build(response, live);
    view.advisor_name = Some(card.name.clone());
    view.advisor_firm = card.firm.clone();
    view.advisor_email = card.email.clone();
    if let Exposure::Full = exposure {
        view.advisor_profile = Some(card);
    }
    view
}

/// Projects `case` for `reader`. A user reader is assumed to be the owner,
/// the service checks that before calling.
pub fn project(case: &CaseContext, reader: &Principal, directory: &impl Directory) -> Result<CaseView> {
    let mut responses = Vec::with_capacity(case.responses.len());
    for response in &case.responses {
        let exposure = match reader.role {
            Role::Admin => Exposure::Full,
            Role::User if response.profile_revealed => Exposure::Full,
            Role::User => Exposure::Hidden,
            Role::Advisor => Exposure::Identity,
        };
        let live = match exposure {
            Exposure::Hidden => None,
            _ => directory.principal(&response.advisor_id)?,
        };
        responses.push(response_view(response, exposure, live.as_ref()));
    }

    let owner_visible = match reader.role {
        Role::Admin => true,
        Role::Advisor => case.user_revealed_to(&reader.id).is_some(),
        Role::User => false,
    };
    let owner_email = if owner_visible {
        directory.principal(&case.owner_user_id)?.map(|r| r.email)
    } else {
        None
    };

    let (owner_user_id, user_revealed_to) = match reader.role {
        Role::Admin | Role::User => (
            Some(case.owner_user_id.clone()),
            Some(case.user_revealed_to.clone()),
        ),
        Role::Advisor => (None, None),
    };

    Ok(CaseView {
        id: case.id.clone(),
        case_id: case.case_id.clone(),
        status: case.status,
        submitted_at: case.submitted_at.clone(),
        details: case.details.clone(),
        owner_user_id,
        owner_email,
        responses,
        user_revealed_to,
    })
}
