use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use reimburse_core::domain::employee::{CompanyId, EmployeeId};
use reimburse_core::domain::expense::{Expense, ExpenseId};
use reimburse_core::domain::policy::{ApprovalCondition, PolicyRule, RuleId};
use reimburse_core::engine::{ApprovalEngine, RequestContext, SubmitExpense};
use reimburse_core::errors::{ApplicationError, InterfaceError};
use reimburse_core::views::{summarize, LedgerSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<ApprovalEngine>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleRequest {
    pub name: String,
    pub sequence: i32,
    pub approver_ids: Vec<EmployeeId>,
    pub condition: ApprovalCondition,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub summary: LedgerSummary,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
    detail: Option<String>,
    correlation_id: String,
}

/// Interface error rendered as a JSON body with a matching status code.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn missing_actor(correlation_id: String) -> Self {
        Self(InterfaceError::BadRequest {
            message: format!("missing `{ACTOR_HEADER}` header"),
            correlation_id,
        })
    }

    fn from_application(error: ApplicationError, ctx: &RequestContext) -> Self {
        Self(error.into_interface(ctx.correlation_id.clone()))
    }

    fn malformed_body(message: String, headers: &HeaderMap) -> Self {
        Self(InterfaceError::BadRequest {
            message,
            correlation_id: correlation_header(headers)
                .unwrap_or_else(|| "unassigned".to_string()),
        })
    }
}

/// JSON body whose rejections render through `ApiError`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::malformed_body(rejection.body_text(), &headers))
    }
}

/// Like `JsonBody`, but an empty body yields `T::default()`.
pub struct OptionalJsonBody<T>(pub T);

impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    T: DeserializeOwned + Default + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::malformed_body(rejection.body_text(), &headers))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes).map(Self).map_err(|error| {
            ApiError::malformed_body(format!("invalid JSON body: {error}"), &headers)
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Server-side failures keep their detail in the logs only.
        let detail = if status.is_client_error() {
            Some(self.0.to_string())
        } else {
            warn!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed on the server side"
            );
            None
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.0.user_message(),
                detail,
                correlation_id: self.0.correlation_id().to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(engine: Arc<ApprovalEngine>) -> Router {
    Router::new()
        .route("/expenses", post(submit_expense))
        .route("/expenses/mine", get(my_submissions))
        .route("/expenses/{id}", get(get_expense))
        .route("/expenses/{id}/approve", post(approve_expense))
        .route("/expenses/{id}/reject", post(reject_expense))
        .route("/approvals/pending", get(pending_approvals))
        .route("/companies/{id}/expenses", get(company_ledger))
        .route("/companies/{id}/rules", get(list_rules))
        .route("/companies/{id}/rules/{rule_id}", put(save_rule).delete(delete_rule))
        .with_state(ApiState { engine })
}

fn correlation_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn request_context(headers: &HeaderMap) -> ApiResult<RequestContext> {
    let correlation_id = correlation_header(headers);

    let actor_id = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(actor_id) = actor_id else {
        return Err(ApiError::missing_actor(
            correlation_id.unwrap_or_else(|| "unassigned".to_string()),
        ));
    };

    let ctx = RequestContext::new(EmployeeId(actor_id.to_string()));
    Ok(match correlation_id {
        Some(correlation_id) => ctx.with_correlation_id(correlation_id),
        None => ctx,
    })
}

async fn submit_expense(
    State(state): State<ApiState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<SubmitExpense>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    let ctx = request_context(&headers)?;
    let expense = state
        .engine
        .submit(&ctx, body)
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn my_submissions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Expense>>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .my_submissions(&ctx)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn get_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Expense>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .expense(&ExpenseId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn approve_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    OptionalJsonBody(body): OptionalJsonBody<DecisionRequest>,
) -> ApiResult<Json<Expense>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .approve(&ctx, &ExpenseId(id), body.comment)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn reject_expense(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    OptionalJsonBody(body): OptionalJsonBody<DecisionRequest>,
) -> ApiResult<Json<Expense>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .reject(&ctx, &ExpenseId(id), body.comment)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn pending_approvals(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Expense>>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .pending_for(&ctx)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn company_ledger(
    Path(company_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<LedgerResponse>> {
    let ctx = request_context(&headers)?;
    let expenses = state
        .engine
        .company_ledger(&ctx, &CompanyId(company_id))
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;
    Ok(Json(LedgerResponse { summary: summarize(&expenses), expenses }))
}

async fn list_rules(
    Path(company_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PolicyRule>>> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .list_rules(&CompanyId(company_id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn save_rule(
    Path((company_id, rule_id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RuleRequest>,
) -> ApiResult<Json<PolicyRule>> {
    let ctx = request_context(&headers)?;
    let rule = PolicyRule {
        id: RuleId(rule_id),
        company_id: CompanyId(company_id),
        name: body.name,
        sequence: body.sequence,
        approver_ids: body.approver_ids,
        condition: body.condition,
        updated_at: Utc::now(),
    };
    state
        .engine
        .save_rule(&ctx, rule)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn delete_rule(
    Path((company_id, rule_id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let ctx = request_context(&headers)?;
    state
        .engine
        .delete_rule(&ctx, &CompanyId(company_id), &RuleId(rule_id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::from_application(error, &ctx))
}
