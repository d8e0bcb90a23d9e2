//! JSON over HTTP front end for the case service

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::error;

use crate::case::CaseDetails;
use crate::error::CaseError;
use crate::gateway::{Operation, authorize};
use crate::identity::{AdvisorProfile, Approval, PrincipalRecord, Role};
use crate::projection::CaseView;
use crate::response::{RespondBody, RespondInput};
use crate::service::{AdvisorReveal, CaseService, RespondOutcome, SubmittedCase, UserReveal};

pub fn create_router(service: CaseService, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/advisors", post(register_advisor))
        .route("/api/admin/advisors/pending", get(pending_advisors))
        .route("/api/admin/advisors/:advisor_id/approve", post(approve_advisor))
        .route("/api/cases", post(submit_case))
        .route("/api/cases/mine", get(own_cases))
        .route("/api/cases/eligible", get(eligible_cases))
        .route("/api/cases/:case_id", get(get_case))
        .route("/api/cases/:case_id/responses", post(submit_response))
        .route("/api/cases/:case_id/reveal-advisor", post(reveal_advisor))
        .route("/api/cases/:case_id/reveal-user", post(reveal_user))
        .with_state(service)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<CaseError> for ApiError {
    fn from(err: CaseError) -> Self {
        let message = err.to_string();
        match err {
            CaseError::Unauthenticated | CaseError::Credentials => {
                ApiError::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            CaseError::Unauthorized(_) => ApiError::new(StatusCode::FORBIDDEN, "unauthorized", message),
            CaseError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "not_found", message),
            CaseError::InvalidInput(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_input", message)
            }
            CaseError::AlreadyResponded { .. } => {
                ApiError::new(StatusCode::CONFLICT, "already_responded", message)
            }
            CaseError::EmailTaken => ApiError::new(StatusCode::CONFLICT, "email_taken", message),
            CaseError::Storage(_) | CaseError::Codec(_) | CaseError::Internal(_) => {
                // full detail goes to the log, not to the client
                error!(error = %message, "request failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // oversized bodies keep their 413, everything else is bad input
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                rejection.body_text(),
            );
        }
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            format!("invalid JSON body: {}", rejection.body_text()),
        )
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn json_body<T>(req: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(body) = req?;
    Ok(body)
}

/// Runs store work off the async runtime.
async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, CaseError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join) => {
            error!(error = %join, "blocking task failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            ))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn require_token(headers: &HeaderMap) -> ApiResult<String> {
    bearer_token(headers).ok_or_else(|| ApiError::from(CaseError::Unauthenticated))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Sessions and accounts
// ============================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub principal_id: String,
    pub role: Role,
}

async fn login(
    State(service): State<CaseService>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let body = json_body(req)?;
    let (record, token) = run_blocking(move || service.login(&body.email, &body.password)).await?;

    Ok(Json(LoginResponse {
        token,
        principal_id: record.id,
        role: record.role,
    }))
}

async fn logout(State(service): State<CaseService>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let token = require_token(&headers)?;
    run_blocking(move || service.logout(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RegisterAdvisorRequest {
    pub email: String,
    pub password: String,
    pub profile: AdvisorProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorSummary {
    pub id: String,
    pub email: String,
    pub approval: Approval,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<AdvisorProfile>,
}

impl From<PrincipalRecord> for AdvisorSummary {
    fn from(record: PrincipalRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            approval: record.approval,
            profile: record.advisor_profile,
        }
    }
}

async fn register_advisor(
    State(service): State<CaseService>,
    req: Result<Json<RegisterAdvisorRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(req)?;
    let record = run_blocking(move || {
        service.register_advisor(&body.email, &body.password, body.profile)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(AdvisorSummary::from(record))))
}

async fn pending_advisors(
    State(service): State<CaseService>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AdvisorSummary>>> {
    let token = require_token(&headers)?;
    let pending = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.list_pending_advisors(&principal)
    })
    .await?;

    Ok(Json(pending.into_iter().map(AdvisorSummary::from).collect()))
}

async fn approve_advisor(
    State(service): State<CaseService>,
    headers: HeaderMap,
    Path(advisor_id): Path<String>,
) -> ApiResult<Json<AdvisorSummary>> {
    let token = require_token(&headers)?;
    let record = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.approve_advisor(&principal, &advisor_id)
    })
    .await?;

    Ok(Json(AdvisorSummary::from(record)))
}

// ============================================================
// Cases
// ============================================================

/// Either a bearer session or inline credentials identify the submitter.
#[derive(Debug, Deserialize)]
pub struct SubmitCaseRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub details: CaseDetails,
}

#[derive(Debug, Serialize)]
pub struct SubmitCaseResponse {
    #[serde(flatten)]
    pub case: SubmittedCase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

async fn submit_case(
    State(service): State<CaseService>,
    headers: HeaderMap,
    req: Result<Json<SubmitCaseRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(req)?;
    let token = bearer_token(&headers);
    let response = run_blocking(move || match (token, body.email, body.password) {
        (Some(token), _, _) => {
            let principal = service.authenticate_token(&token)?;
            let case = service.submit_case(&principal, body.details)?;
            Ok(SubmitCaseResponse { case, token: None })
        }
        (None, Some(email), Some(password)) => {
            let (case, token) = service.submit_case_with_credentials(&email, &password, body.details)?;
            Ok(SubmitCaseResponse {
                case,
                token: Some(token),
            })
        }
        _ => Err(CaseError::Unauthenticated),
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn own_cases(
    State(service): State<CaseService>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<CaseView>>> {
    let token = require_token(&headers)?;
    let cases = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.list_own_cases(&principal)
    })
    .await?;

    Ok(Json(cases))
}

async fn eligible_cases(
    State(service): State<CaseService>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<CaseView>>> {
    let token = require_token(&headers)?;
    let cases = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.list_eligible_cases(&principal)
    })
    .await?;

    Ok(Json(cases))
}

async fn get_case(
    State(service): State<CaseService>,
    headers: HeaderMap,
    Path(case_id): Path<String>,
) -> ApiResult<Json<CaseView>> {
    let token = require_token(&headers)?;
    let view = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.get_case(&principal, &case_id)
    })
    .await?;

    Ok(Json(view))
}

async fn submit_response(
    State(service): State<CaseService>,
    headers: HeaderMap,
    Path(case_id): Path<String>,
    req: Result<Json<RespondBody>, JsonRejection>,
) -> ApiResult<Json<RespondOutcome>> {
    let token = require_token(&headers)?;
    let body = json_body(req)?;
    let outcome = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        // role first, so a user posting an empty body hears about the role
        authorize(&principal, Operation::SubmitResponse)?;
        let input = RespondInput::try_from(body)?;
        service.submit_response(&principal, &case_id, input)
    })
    .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealAdvisorRequest {
    pub advisor_id: String,
}

async fn reveal_advisor(
    State(service): State<CaseService>,
    headers: HeaderMap,
    Path(case_id): Path<String>,
    req: Result<Json<RevealAdvisorRequest>, JsonRejection>,
) -> ApiResult<Json<AdvisorReveal>> {
    let token = require_token(&headers)?;
    let body = json_body(req)?;
    let reveal = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.reveal_advisor(&principal, &case_id, &body.advisor_id)
    })
    .await?;

    Ok(Json(reveal))
}

async fn reveal_user(
    State(service): State<CaseService>,
    headers: HeaderMap,
    Path(case_id): Path<String>,
) -> ApiResult<Json<UserReveal>> {
    let token = require_token(&headers)?;
    let reveal = run_blocking(move || {
        let principal = service.authenticate_token(&token)?;
        service.reveal_user(&principal, &case_id)
    })
    .await?;

    Ok(Json(reveal))
}
