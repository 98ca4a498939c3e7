pub mod health;
pub mod params;
pub mod payments;
pub mod supports;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::hub::server::router())
        .nest("/api/v1", payments::router().merge(supports::router()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        payments::payment_callback,
        supports::create_support,
        supports::list_supporters,
        supports::fan_spending,
        supports::fan_history,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            crate::payments::webhook::CallbackPayload,
            health::HealthResponse,
            supports::CreateSupportRequest,
            supports::CreateSupportResponse,
            supports::SupportersResponse,
            supports::FanSpendingResponse,
            supports::FanHistoryResponse,
            crate::payments::ledger::SupporterEntry,
            crate::payments::ledger::HistoryEntry,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Supports", description = "Donations"),
    )
)]
pub struct ApiDoc;
