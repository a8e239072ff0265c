//! Outbound email via a Postmark-style REST mail API. Two messages exist:
//! the confirmation link and the results delivery.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail api returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_base: String,
    pub api_token: String,
    pub sender: String,
    pub timeout_secs: u64,
}

impl MailerConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("MAIL_API_BASE")
                .unwrap_or_else(|_| "https://api.postmarkapp.com".into()),
            api_token: std::env::var("MAIL_API_TOKEN").unwrap_or_default(),
            sender: std::env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "scanner@clearself.ai".into()),
            timeout_secs: std::env::var("MAIL_TIMEOUT_SECONDS")
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    http: reqwest::Client,
    config: MailerConfig,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, MailError> {
        Self::new(MailerConfig::from_env())
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let request = SendEmailRequest {
            from: &self.config.sender,
            to: &email.to,
            subject: &email.subject,
            html_body: &email.html_body,
            text_body: &email.text_body,
        };

        let response = self
            .http
            .post(format!("{}/email", self.config.api_base))
            .header("X-Postmark-Server-Token", &self.config.api_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api { status, body });
        }

        info!("dispatched email");
        Ok(())
    }
}

/// Minimal HTML escaping for user-controlled text embedded in email bodies.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// The double-opt-in message: a single button linking to the confirmation
/// endpoint with the token embedded.
pub fn confirmation_email(to: &str, confirm_url: &str) -> OutgoingEmail {
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #0f766e;">Confirm your email address</h2>
  <p>Thank you for your interest in a ClearSelf analysis.</p>
  <p>To receive your analysis, please confirm your email address:</p>
  <p style="margin: 30px 0;">
    <a href="{confirm_url}"
       style="background: #0f766e; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">
      Request my analysis
    </a>
  </p>
  <p style="color: #666; font-size: 0.9em;">
    If you did not request this analysis, you can ignore this email.
  </p>
</div>"#
    );
    let text_body = format!(
        "Thank you for your interest in a ClearSelf analysis.\n\n\
         To receive your analysis, please confirm your email address:\n{confirm_url}\n\n\
         If you did not request this analysis, you can ignore this email.\n"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Please confirm your ClearSelf analysis".into(),
        html_body,
        text_body,
    }
}

/// The delivery message carrying the generated analysis. The text is
/// LLM-produced free text: escaped, then newlines rendered as line breaks.
pub fn results_email(to: &str, analysis: &str) -> OutgoingEmail {
    let analysis_html = escape_html(analysis).replace('\n', "<br>");
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #0f766e;">Your personal ClearSelf analysis</h2>
  <p>Thank you for your trust in the ClearSelf Scanner. Here is your individual analysis:</p>
  <div style="background: #f5f5f9; padding: 20px; border-radius: 8px; margin: 20px 0;">
    {analysis_html}
  </div>
  <p style="color: #666;">
    <small>
      This analysis was created with the help of AI and does not replace professional
      therapeutic advice. For serious concerns, please consult a qualified professional.
    </small>
  </p>
</div>"#
    );
    let text_body = format!(
        "Thank you for your trust in the ClearSelf Scanner. Here is your individual analysis:\n\n\
         {analysis}\n\n\
         This analysis was created with the help of AI and does not replace professional \
         therapeutic advice.\n"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Your ClearSelf Scanner analysis".into(),
        html_body,
        text_body,
    }
}
