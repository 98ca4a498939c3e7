//! Donation creation and the paid-donation listings.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::support::{amount_as_number, NewSupport, SupportStatus};
use crate::models::user::{User, UserId};
use crate::payments::duitku::InvoiceRequest;
use crate::payments::ledger::{generate_support_id, HistoryEntry, SupporterEntry};
use crate::AppState;

use super::params::{page_request, parse_user_id};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/supports", post(create_support))
        .route("/supports/best", get(list_supporters))
        .route("/supports/fan-spending", get(fan_spending))
        .route("/supports/fan-spending/history", get(fan_history))
}

// ---------------------------------------------------------------------------
// POST /api/v1/supports
// ---------------------------------------------------------------------------

/// The fan is trusted as asserted here; authentication happens upstream.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSupportRequest {
    pub fan_id: UserId,
    pub creator_id: UserId,
    /// Whole rupiah.
    pub amount: i64,
    /// Receipt address passed to the payment provider.
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSupportResponse {
    pub payment_url: String,
    pub support_id: String,
}

fn validate(body: &CreateSupportRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if body.fan_id <= 0 {
        errors.push(FieldError::new("fan_id", "fan id must be a positive number"));
    }
    if body.creator_id <= 0 {
        errors.push(FieldError::new("creator_id", "creator id must be a positive number"));
    }
    if body.amount <= 0 {
        errors.push(FieldError::new("amount", "amount must be greater than 0"));
    }
    if !body.email.contains('@') {
        errors.push(FieldError::new("email", "email must be a valid address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(errors))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/supports",
    tag = "Supports",
    request_body = CreateSupportRequest,
    responses(
        (status = 201, description = "Invoice created, donation pending", body = CreateSupportResponse),
        (status = 400, description = "Validation error or recipient is not a creator", body = ApiErrorBody),
        (status = 403, description = "Sender is not a fan", body = ApiErrorBody),
        (status = 404, description = "Fan or creator not found", body = ApiErrorBody),
        (status = 502, description = "Payment provider unavailable", body = ApiErrorBody),
    ),
)]
pub async fn create_support(
    State(state): State<AppState>,
    Json(body): Json<CreateSupportRequest>,
) -> Result<(StatusCode, Json<CreateSupportResponse>), ApiError> {
    validate(&body)?;

    let fan = state
        .ledger
        .find_user(body.fan_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Fan not found"))?;
    if !fan.is_fan() {
        return Err(ApiError::forbidden("Only fans can send support"));
    }

    let creator = state
        .ledger
        .find_user(body.creator_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Creator not found"))?;
    if !creator.is_creator() {
        return Err(ApiError::bad_request("Support can only be sent to creators"));
    }

    let timestamp_ms = Utc::now().timestamp_millis();
    let support_id = generate_support_id(timestamp_ms, creator.id, fan.id);
    let amount = BigDecimal::from(body.amount);

    let invoice = state
        .payments
        .create_invoice(
            &InvoiceRequest {
                amount: amount.clone(),
                merchant_order_id: support_id.clone(),
                product_details: format!("{} provided support of IDR {} to {}", fan.name, body.amount, creator.name),
                email: body.email,
                callback_url: state.config.callback_url(),
            },
            timestamp_ms,
        )
        .await?;

    state
        .ledger
        .create_pending(NewSupport {
            fan_id: fan.id,
            creator_id: creator.id,
            amount,
            support_id: support_id.clone(),
            reference_code: invoice.reference,
            status: SupportStatus::Pending.as_str().to_string(),
            sent_at: Utc::now(),
            payment_timestamp: timestamp_ms,
        })
        .await?;

    tracing::info!(%support_id, fan_id = fan.id, creator_id = creator.id, "support pending payment");

    Ok((
        StatusCode::CREATED,
        Json(CreateSupportResponse {
            payment_url: invoice.payment_url,
            support_id,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Look up the account named in the query and check its role.
async fn account_with_role(state: &AppState, id: UserId, role: &str) -> Result<User, ApiError> {
    let user = state
        .ledger
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if user.role != role {
        return Err(ApiError::forbidden(format!("Only {role}s can view this")));
    }
    Ok(user)
}

#[derive(Debug, Deserialize)]
pub struct SupportersParams {
    pub creator_id: Option<String>,
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupportersResponse {
    pub data: Vec<SupporterEntry>,
    pub has_more: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/supports/best",
    tag = "Supports",
    params(
        ("creator_id" = i64, Query, description = "Creator whose supporters to list"),
        ("before" = Option<i64>, Query, description = "Cursor: id of the last entry already seen"),
        ("limit" = Option<i64>, Query, description = "Number of entries (1-50, default 10)"),
    ),
    responses(
        (status = 200, description = "Paid donations received, newest first", body = SupportersResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Account is not a creator", body = ApiErrorBody),
        (status = 404, description = "Creator not found", body = ApiErrorBody),
    ),
)]
pub async fn list_supporters(
    State(state): State<AppState>,
    Query(params): Query<SupportersParams>,
) -> Result<Json<SupportersResponse>, ApiError> {
    let creator_id = parse_user_id("creator_id", params.creator_id.as_deref())?;
    let page = page_request(params.before, params.limit)?;
    let creator = account_with_role(&state, creator_id, User::ROLE_CREATOR).await?;

    let page = state.ledger.creator_supporters(creator.id, page).await?;
    Ok(Json(SupportersResponse {
        data: page.data,
        has_more: page.has_more,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FanParams {
    pub fan_id: Option<String>,
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FanSpendingResponse {
    pub fan_id: UserId,
    /// Sum of paid donations, in rupiah.
    #[serde(serialize_with = "amount_as_number")]
    #[schema(value_type = f64)]
    pub total: BigDecimal,
}

#[utoipa::path(
    get,
    path = "/api/v1/supports/fan-spending",
    tag = "Supports",
    params(("fan_id" = i64, Query, description = "Fan whose spending to total")),
    responses(
        (status = 200, description = "Total of the fan's paid donations", body = FanSpendingResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Account is not a fan", body = ApiErrorBody),
        (status = 404, description = "Fan not found", body = ApiErrorBody),
    ),
)]
pub async fn fan_spending(
    State(state): State<AppState>,
    Query(params): Query<FanParams>,
) -> Result<Json<FanSpendingResponse>, ApiError> {
    let fan_id = parse_user_id("fan_id", params.fan_id.as_deref())?;
    let fan = account_with_role(&state, fan_id, User::ROLE_FAN).await?;

    let total = state.ledger.fan_spending(fan.id).await?;
    Ok(Json(FanSpendingResponse { fan_id: fan.id, total }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FanHistoryResponse {
    pub data: Vec<HistoryEntry>,
    pub has_more: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/supports/fan-spending/history",
    tag = "Supports",
    params(
        ("fan_id" = i64, Query, description = "Fan whose donations to list"),
        ("before" = Option<i64>, Query, description = "Cursor: id of the last entry already seen"),
        ("limit" = Option<i64>, Query, description = "Number of entries (1-50, default 10)"),
    ),
    responses(
        (status = 200, description = "Paid donations sent, newest first", body = FanHistoryResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Account is not a fan", body = ApiErrorBody),
        (status = 404, description = "Fan not found", body = ApiErrorBody),
    ),
)]
pub async fn fan_history(
    State(state): State<AppState>,
    Query(params): Query<FanParams>,
) -> Result<Json<FanHistoryResponse>, ApiError> {
    let fan_id = parse_user_id("fan_id", params.fan_id.as_deref())?;
    let page = page_request(params.before, params.limit)?;
    let fan = account_with_role(&state, fan_id, User::ROLE_FAN).await?;

    let page = state.ledger.fan_history(fan.id, page).await?;
    Ok(Json(FanHistoryResponse {
        data: page.data,
        has_more: page.has_more,
    }))
}
