//! Payment provider callback endpoint.

use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::routing::post;
use axum::{Form, Json, Router};
use support_common::id::{prefix, prefixed_ulid};
use tracing::Instrument;

use crate::error::{ApiError, ApiErrorBody};
use crate::payments::webhook::CallbackPayload;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payment/callback", post(payment_callback))
}

/// The provider posts form-encoded bodies; JSON is accepted when labelled so.
pub struct CallbackBody(pub CallbackPayload);

impl<S> FromRequest<S> for CallbackBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let payload = if is_json {
            Json::<CallbackPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?
                .0
        } else {
            Form::<CallbackPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?
                .0
        };
        Ok(Self(payload))
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/payment/callback
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/payment/callback",
    tag = "Payments",
    request_body(
        content = CallbackPayload,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "`SUCCESS` or `IGNORED`", body = String, content_type = "text/plain"),
        (status = 400, description = "Malformed callback or amount mismatch", body = ApiErrorBody),
        (status = 403, description = "Invalid signature", body = ApiErrorBody),
        (status = 404, description = "Unknown transaction", body = ApiErrorBody),
    ),
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    CallbackBody(payload): CallbackBody,
) -> Result<&'static str, ApiError> {
    let delivery_id = prefixed_ulid(prefix::CALLBACK);
    let status = state
        .webhooks
        .handle(&payload)
        .instrument(tracing::info_span!("payment_callback", %delivery_id))
        .await?;
    Ok(status.as_str())
}
