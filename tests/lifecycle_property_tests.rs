//! Property-based tests for the case document and its role projection
//!
//! These drive `CaseContext` through random sequences of responses and reveals
//! without touching sled, then check the invariants that must hold after every
//! step: status only moves forward, reveals are idempotent, user reveals are
//! per advisor, and a user never sees an unrevealed advisor's identity.

use std::collections::HashMap;

use case_lifecycle::{
    case::{CaseDetails, CaseStatus, Response, ResponseSections, TimeStamp},
    context::{CaseContext, RevealOutcome},
    error::CaseError,
    gateway::Principal,
    identity::{AdvisorProfile, Approval, PrincipalRecord, Role},
    projection::project,
    response::{RespondInput, synthesise},
};
use proptest::prelude::*;

const ADVISORS: [&str; 4] = ["adv_a", "adv_b", "adv_c", "adv_d"];

// PROPERTY TEST STRATEGIES

#[derive(Debug, Clone)]
enum Step {
    Respond(usize),
    RevealAdvisor(usize),
    RevealUser(usize),
}

/// Strategy to generate one lifecycle step against one of the advisors
fn step_strategy() -> impl Strategy<Value = Step> {
    (0usize..ADVISORS.len(), 0u8..3).prop_map(|(advisor, kind)| match kind {
        0 => Step::Respond(advisor),
        1 => Step::RevealAdvisor(advisor),
        _ => Step::RevealUser(advisor),
    })
}

/// Strategy to generate optional section text, sometimes blank
fn section_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("   ".to_string())),
        "[a-z]{1,12}( [a-z]{1,12}){0,3}".prop_map(Some),
    ]
}

fn rank(status: CaseStatus) -> u8 {
    match status {
        CaseStatus::Submitted => 0,
        CaseStatus::Responded => 1,
        CaseStatus::ProfileRevealed => 2,
        CaseStatus::Closed => 3,
    }
}

fn fresh_case() -> CaseContext {
    CaseContext::new(
        "case_test".into(),
        "case-001".into(),
        "owner".into(),
        CaseDetails::new().set_situation("Weighing a job offer abroad"),
    )
}

fn response_from(advisor: &str) -> Response {
    Response::new(
        advisor.to_string(),
        format!("Advisor {advisor}"),
        Some("Firm".into()),
        format!("answer from {advisor}"),
        None,
        TimeStamp::new(),
    )
}

fn apply(case: &mut CaseContext, step: &Step) {
    match step {
        Step::Respond(i) => {
            let _ = case.insert_response(response_from(ADVISORS[*i]));
        }
        Step::RevealAdvisor(i) => {
            let _ = case.reveal_advisor(ADVISORS[*i], TimeStamp::new());
        }
        Step::RevealUser(i) => {
            case.reveal_user(ADVISORS[*i], TimeStamp::new());
        }
    }
}

fn directory() -> HashMap<String, PrincipalRecord> {
    let mut directory = HashMap::new();
    directory.insert(
        "owner".to_string(),
        PrincipalRecord {
            id: "owner".into(),
            role: Role::User,
            email: "owner@example.com".into(),
            password_hash: String::new(),
            approval: Approval::Approved,
            advisor_profile: None,
            created_at: TimeStamp::new(),
        },
    );
    for advisor in ADVISORS {
        directory.insert(
            advisor.to_string(),
            PrincipalRecord {
                id: advisor.into(),
                role: Role::Advisor,
                email: format!("{advisor}@advisors.example"),
                password_hash: String::new(),
                approval: Approval::Approved,
                advisor_profile: Some(AdvisorProfile {
                    name: format!("Advisor {advisor}"),
                    bio: Some("Cross-border careers".into()),
                    ..AdvisorProfile::default()
                }),
                created_at: TimeStamp::new(),
            },
        );
    }
    directory
}

fn reader(id: &str, role: Role) -> Principal {
    Principal {
        id: id.into(),
        role,
        approved: true,
    }
}

// PROPERTY TESTS
proptest! {
    /// Property: status never moves backwards, and always matches what the
    /// responses imply
    #[test]
    fn prop_status_is_monotonic(steps in prop::collection::vec(step_strategy(), 0..24)) {
        let mut case = fresh_case();
        let mut previous = case.status;

        for step in &steps {
            let had_responses = !case.responses.is_empty();
            apply(&mut case, step);

            prop_assert!(rank(case.status) >= rank(previous));
            prop_assert_eq!(case.status, case.current_state());
            if !had_responses && !case.responses.is_empty() {
                prop_assert!(previous == CaseStatus::Submitted);
                prop_assert!(case.status == CaseStatus::Responded);
            }
            previous = case.status;
        }
    }

    /// Property: each advisor holds at most one response, whatever the order
    #[test]
    fn prop_one_response_per_advisor(steps in prop::collection::vec(step_strategy(), 0..24)) {
        let mut case = fresh_case();
        for step in &steps {
            if let Step::Respond(i) = step {
                let before = case.responses.len();
                let already = case.response_from(ADVISORS[*i]).is_some();
                let result = case.insert_response(response_from(ADVISORS[*i]));
                if already {
                    let is_duplicate = matches!(result, Err(CaseError::AlreadyResponded { .. }));
                    prop_assert!(is_duplicate);
                    prop_assert_eq!(case.responses.len(), before);
                } else {
                    prop_assert!(result.is_ok());
                }
            } else {
                apply(&mut case, step);
            }
        }

        for advisor in ADVISORS {
            let count = case.responses.iter().filter(|r| r.advisor_id == advisor).count();
            prop_assert!(count <= 1);
        }
    }

    /// Property: revealing an advisor a second time leaves the document as it was
    #[test]
    fn prop_reveal_advisor_is_idempotent(
        steps in prop::collection::vec(step_strategy(), 0..16),
        target in 0usize..ADVISORS.len(),
    ) {
        let mut case = fresh_case();
        for step in &steps {
            apply(&mut case, step);
        }
        let _ = case.insert_response(response_from(ADVISORS[target]));

        case.reveal_advisor(ADVISORS[target], TimeStamp::new()).unwrap();
        let snapshot = case.clone();

        let again = case.reveal_advisor(ADVISORS[target], TimeStamp::new()).unwrap();
        prop_assert_eq!(again, RevealOutcome::AlreadyGranted);
        prop_assert_eq!(&case, &snapshot);
        prop_assert_eq!(case.status, CaseStatus::ProfileRevealed);
    }

    /// Property: a user reveal grants exactly one advisor and never moves status
    #[test]
    fn prop_reveal_user_is_per_advisor(
        steps in prop::collection::vec(step_strategy(), 0..16),
        target in 0usize..ADVISORS.len(),
    ) {
        let mut case = fresh_case();
        for step in &steps {
            apply(&mut case, step);
        }

        let status = case.status;
        let holders: Vec<_> = ADVISORS
            .iter()
            .filter(|a| case.user_revealed_to(a).is_some())
            .collect();

        case.reveal_user(ADVISORS[target], TimeStamp::new());

        prop_assert_eq!(case.status, status);
        prop_assert!(case.user_revealed_to(ADVISORS[target]).is_some());
        for advisor in ADVISORS.iter().filter(|a| **a != ADVISORS[target]) {
            prop_assert_eq!(case.user_revealed_to(advisor).is_some(), holders.contains(&advisor));
        }
    }

    /// Property: the stored body of a structured response is its non-blank
    /// sections joined by blank lines, approach first
    #[test]
    fn prop_synthesised_body_follows_sections(
        approach in "[a-z]{1,12}( [a-z]{1,12}){0,3}",
        clarify in section_strategy(),
        decisions in section_strategy(),
        fees in section_strategy(),
        suits in section_strategy(),
    ) {
        let sections = ResponseSections {
            approach: approach.clone(),
            clarify_before_advice: clarify.clone(),
            how_decisions_made: decisions.clone(),
            fee_philosophy: fees.clone(),
            who_this_suits: suits.clone(),
        };
        let validated = RespondInput::Structured(sections).validate().unwrap();

        let expected: Vec<String> = [Some(approach), clarify, decisions, fees, suits]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        prop_assert_eq!(&validated.body, &expected.join("\n\n"));
        prop_assert_eq!(synthesise(validated.sections.as_ref().unwrap()), validated.body);
    }

    /// Property: a lone approach is stored verbatim
    #[test]
    fn prop_approach_alone_is_the_body(approach in "[a-z]{1,12}( [a-z]{1,12}){0,3}") {
        let validated = RespondInput::Structured(ResponseSections::new(&approach)).validate().unwrap();
        prop_assert_eq!(validated.body, approach);
    }

    /// Property: the owner's payload never names an advisor they have not revealed
    #[test]
    fn prop_user_view_hides_unrevealed_advisors(steps in prop::collection::vec(step_strategy(), 0..24)) {
        let mut case = fresh_case();
        for step in &steps {
            apply(&mut case, step);
        }
        let directory = directory();
        let view = project(&case, &reader("owner", Role::User), &directory).unwrap();
        let json = serde_json::to_value(&view).unwrap();

        prop_assert!(json.get("ownerEmail").is_none());
        for (response, rendered) in case.responses.iter().zip(json["responses"].as_array().unwrap()) {
            let email = format!("{}@advisors.example", response.advisor_id);
            let text = rendered.to_string();
            if response.profile_revealed {
                prop_assert!(text.contains(&email));
            } else {
                prop_assert!(!text.contains(&email));
                prop_assert!(rendered.get("advisorName").is_none());
                prop_assert!(rendered.get("advisorProfile").is_none());
            }
        }
    }

    /// Property: an advisor sees the owner's email exactly when they hold a grant
    #[test]
    fn prop_owner_email_follows_grants(
        steps in prop::collection::vec(step_strategy(), 0..24),
        viewer in 0usize..ADVISORS.len(),
    ) {
        let mut case = fresh_case();
        for step in &steps {
            apply(&mut case, step);
        }
        let directory = directory();
        let view = project(&case, &reader(ADVISORS[viewer], Role::Advisor), &directory).unwrap();

        let granted = case.user_revealed_to(ADVISORS[viewer]).is_some();
        prop_assert_eq!(view.owner_email.is_some(), granted);
        prop_assert!(view.owner_user_id.is_none());
        prop_assert!(view.user_revealed_to.is_none());
        for response in &view.responses {
            prop_assert!(response.advisor_profile.is_none());
        }
    }
}
