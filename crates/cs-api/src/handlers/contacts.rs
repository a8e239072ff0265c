use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use tracing::info;

use cs_common::db::{delete_contact_with_analyses, list_contact_summaries};
use cs_common::model::ContactSummary;
use cs_common::validate::{is_valid_email, normalize_email};

use crate::error::ApiError;
use crate::SharedState;

/// All contacts, newest first, with analysis counts. Read-only.
pub async fn list_contacts(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ContactSummary>>, ApiError> {
    let summaries = list_contact_summaries(&state.pool).await?;
    Ok(Json(summaries))
}

/// Remove a contact and all analyses it owns. The email is validated before
/// storage is touched; deletion order (analyses first) lives in the storage
/// layer.
pub async fn delete_contact(
    State(state): State<SharedState>,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("email address is malformed".into()));
    }

    let removed_analyses = delete_contact_with_analyses(&state.pool, &email).await?;
    info!(%email, removed_analyses, "contact deleted");

    Ok(Json(json!({ "success": true })))
}
