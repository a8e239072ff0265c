use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use cs_common::db::{insert_pending_analysis, upsert_pending_contact};
use cs_common::mail::confirmation_email;
use cs_common::token::generate_token;
use cs_common::validate::{is_valid_email, normalize_email};

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub email: Option<String>,
    pub situation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub message: String,
}

fn validate_submission(payload: &AnalyzeRequest) -> Result<(String, String), ApiError> {
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Validation("email and situation are required".into()))?;
    let situation = payload
        .situation
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Validation("email and situation are required".into()))?;

    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("email address is malformed".into()));
    }

    Ok((email, situation.to_string()))
}

/// Submission: record the contact and its pending analysis, then mail the
/// confirmation link. The analysis row is written before the email goes out,
/// because confirmation looks it up by contact id. Nothing here waits for the
/// confirmation itself.
pub async fn submit(
    State(state): State<SharedState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let (email, situation) = validate_submission(&payload)?;

    let token = generate_token();
    let contact = upsert_pending_contact(&state.pool, &email, &token).await?;
    let analysis = insert_pending_analysis(&state.pool, contact.id, &situation).await?;

    let confirm_url = state.confirm_url(&token);
    state
        .mailer
        .send(&confirmation_email(&contact.email, &confirm_url))
        .await?;

    info!(
        contact_id = contact.id,
        analysis_id = analysis.id,
        "submission accepted, confirmation email sent"
    );

    Ok(Json(AnalyzeResponse {
        success: true,
        message: "Please confirm your email address. You will receive an email from us shortly."
            .into(),
    }))
}
