use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};
use tracing::{error, info, warn};

use cs_common::db::{
    activate_by_token, clear_confirmation_token, complete_analysis, latest_pending_for_contact,
    revert_completion, revert_to_pending, TokenActivation,
};
use cs_common::mail::results_email;
use cs_common::model::Contact;
use cs_common::token::looks_like_token;

use crate::SharedState;

/// Confirmation is a browser-facing endpoint; every outcome renders a small
/// HTML page rather than a JSON error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
    InvalidLink,
    NoPendingAnalysis,
    RetryLater,
    ServerError,
}

impl ConfirmOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            ConfirmOutcome::Confirmed | ConfirmOutcome::AlreadyConfirmed => StatusCode::OK,
            ConfirmOutcome::InvalidLink => StatusCode::BAD_REQUEST,
            ConfirmOutcome::NoPendingAnalysis => StatusCode::NOT_FOUND,
            ConfirmOutcome::RetryLater => StatusCode::BAD_GATEWAY,
            ConfirmOutcome::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            ConfirmOutcome::Confirmed => "Email address confirmed!",
            ConfirmOutcome::AlreadyConfirmed => "Already confirmed",
            ConfirmOutcome::InvalidLink => "Invalid confirmation link",
            ConfirmOutcome::NoPendingAnalysis => "No pending analysis",
            ConfirmOutcome::RetryLater => "Something went wrong",
            ConfirmOutcome::ServerError => "Service error",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ConfirmOutcome::Confirmed => {
                "Thank you for your confirmation. Your analysis has been created and \
                 is on its way to your inbox."
            }
            ConfirmOutcome::AlreadyConfirmed => {
                "This email address was already confirmed. Your analysis has been \
                 delivered; no new one was generated."
            }
            ConfirmOutcome::InvalidLink => {
                "This confirmation link is invalid or has already been used."
            }
            ConfirmOutcome::NoPendingAnalysis => {
                "Your email address is confirmed, but there is no analysis waiting \
                 to be generated. Please submit your situation again."
            }
            ConfirmOutcome::RetryLater => {
                "An error occurred while creating your analysis. Please try again \
                 later by clicking the link in your email once more."
            }
            ConfirmOutcome::ServerError => {
                "An internal error occurred. Please try again later by clicking \
                 the link in your email once more."
            }
        }
    }

    pub fn page(&self) -> Html<String> {
        let class = match self.status() {
            StatusCode::OK => "success",
            _ => "failure",
        };
        Html(format!(
            r#"<html>
  <head>
    <style>
      body {{ font-family: Arial; margin: 40px; text-align: center; }}
      .success {{ color: #0f766e; }}
      .failure {{ color: #b91c1c; }}
    </style>
  </head>
  <body>
    <h1 class="{class}">{heading}</h1>
    <p>{body}</p>
    <p><a href="https://clearself.ai">Back to the website</a></p>
  </body>
</html>"#,
            heading = self.heading(),
            body = self.body(),
        ))
    }
}

/// Generate and deliver the analysis for a freshly activated contact. Runs
/// synchronously inside the request: LLM round trip, then results email, then
/// token clearing, in that order. A failure reverts the contact (and a
/// completed-but-undelivered analysis) back to pending so the same link can
/// be re-clicked, except when a concurrent request already claimed the
/// analysis.
async fn generate_and_deliver(state: &SharedState, contact: &Contact) -> ConfirmOutcome {
    let pending = match latest_pending_for_contact(&state.pool, contact.id).await {
        Ok(Some(analysis)) => analysis,
        Ok(None) => {
            warn!(contact_id = contact.id, "confirmed but no pending analysis");
            return ConfirmOutcome::NoPendingAnalysis;
        }
        Err(err) => {
            error!(contact_id = contact.id, error = %err, "pending analysis lookup failed");
            revert_activation(state, contact, None).await;
            return ConfirmOutcome::ServerError;
        }
    };

    let text = match state.llm.generate_analysis(&pending.situation).await {
        Ok(text) => text,
        Err(err) => {
            error!(contact_id = contact.id, analysis_id = pending.id, error = %err, "llm generation failed");
            revert_activation(state, contact, None).await;
            return ConfirmOutcome::RetryLater;
        }
    };

    match complete_analysis(&state.pool, pending.id, &text).await {
        Ok(0) => {
            // The analysis is no longer pending, so a concurrent request
            // claimed it and owns delivery. Do not send a duplicate email and
            // do not revert the contact out from under the winner.
            warn!(analysis_id = pending.id, "analysis already completed elsewhere");
            return ConfirmOutcome::RetryLater;
        }
        Ok(_) => {}
        Err(err) => {
            error!(analysis_id = pending.id, error = %err, "failed to store analysis result");
            revert_activation(state, contact, None).await;
            return ConfirmOutcome::ServerError;
        }
    }

    if let Err(err) = state
        .mailer
        .send(&results_email(&contact.email, &text))
        .await
    {
        error!(contact_id = contact.id, analysis_id = pending.id, error = %err, "results email failed");
        revert_activation(state, contact, Some(pending.id)).await;
        return ConfirmOutcome::RetryLater;
    }

    // Only now is the link spent. A failure above leaves the token valid so
    // the user can retry by re-clicking.
    if let Err(err) = clear_confirmation_token(&state.pool, contact.id).await {
        // The analysis is stored and delivered; a live token is the lesser
        // problem, so report success and log the inconsistency.
        error!(contact_id = contact.id, error = %err, "failed to clear confirmation token");
    }

    info!(
        contact_id = contact.id,
        analysis_id = pending.id,
        "analysis generated and delivered"
    );
    ConfirmOutcome::Confirmed
}

async fn revert_activation(state: &SharedState, contact: &Contact, analysis_id: Option<i64>) {
    if let Some(analysis_id) = analysis_id {
        if let Err(err) = revert_completion(&state.pool, analysis_id).await {
            error!(analysis_id, error = %err, "failed to revert analysis completion");
        }
    }
    if let Err(err) = revert_to_pending(&state.pool, contact.id).await {
        error!(contact_id = contact.id, error = %err, "failed to revert contact to pending");
    }
}

pub async fn confirm(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> (StatusCode, Html<String>) {
    if !looks_like_token(&token) {
        let outcome = ConfirmOutcome::InvalidLink;
        return (outcome.status(), outcome.page());
    }

    let outcome = match activate_by_token(&state.pool, &token).await {
        Ok(TokenActivation::Activated(contact)) => generate_and_deliver(&state, &contact).await,
        Ok(TokenActivation::AlreadyActive(contact)) => {
            info!(contact_id = contact.id, "repeated confirmation click");
            ConfirmOutcome::AlreadyConfirmed
        }
        Ok(TokenActivation::Unknown) => ConfirmOutcome::InvalidLink,
        Err(err) => {
            error!(error = %err, "token activation failed");
            ConfirmOutcome::ServerError
        }
    };

    (outcome.status(), outcome.page())
}
