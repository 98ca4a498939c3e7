//! Query-string helpers shared by handlers.

use crate::error::{ApiError, FieldError};
use crate::models::user::UserId;
use crate::payments::ledger::PageRequest;

/// Parse a required positive account id. `field` is the query key
/// (`creator_id`), echoed back in the field error.
pub fn parse_user_id(field: &str, raw: Option<&str>) -> Result<UserId, ApiError> {
    let label = field.replace('_', " ");
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation(vec![FieldError::new(field, format!("{label} is required"))]))?;

    raw.parse::<UserId>().ok().filter(|id| *id > 0).ok_or_else(|| {
        ApiError::validation(vec![FieldError::new(field, format!("{label} must be a positive number"))])
    })
}

/// `before` is the id of the last row already seen.
pub fn page_request(before: Option<i64>, limit: Option<i64>) -> Result<PageRequest, ApiError> {
    if before.is_some_and(|id| id <= 0) {
        return Err(ApiError::validation(vec![FieldError::new(
            "before",
            "before must be a positive id",
        )]));
    }
    Ok(PageRequest::new(before, limit))
}
