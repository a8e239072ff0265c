use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use tokio_postgres::{Error as PgError, Row};
use tracing::instrument;

use crate::db::PgPool;
use crate::model::{Contact, ContactStatus, ContactSummary};

#[derive(Debug, thiserror::Error)]
pub enum ContactStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map contact row: {0}")]
    Mapping(String),
    #[error("contact not found: {0}")]
    NotFound(String),
}

/// Result of the atomic activation attempt during confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenActivation {
    /// The compare-and-set transitioned the contact from pending to active.
    Activated(Contact),
    /// The token exists but its contact is already active; repeated clicks on
    /// the same link land here.
    AlreadyActive(Contact),
    /// No contact carries this token (never issued, or cleared after a
    /// completed delivery).
    Unknown,
}

const CONTACT_COLUMNS: &str = "id, email, status, confirmation_token, confirmed_at, created_at";

fn map_contact(row: &Row) -> Result<Contact, ContactStorageError> {
    let status_raw: String = row.get("status");
    let status = ContactStatus::parse(&status_raw)
        .ok_or_else(|| ContactStorageError::Mapping(format!("unknown status: {status_raw}")))?;

    Ok(Contact {
        id: row.get("id"),
        email: row.get("email"),
        status,
        confirmation_token: row.get("confirmation_token"),
        confirmed_at: row.get("confirmed_at"),
        created_at: row.get("created_at"),
    })
}

/// Create the contact for `email`, or refresh an existing one. Either way the
/// row leaves this call as `pending` and carrying `token`: every submission
/// is gated on a fresh confirmation, and a reissued token invalidates any
/// previously mailed link. Single statement, so concurrent submissions for
/// the same address cannot interleave.
#[instrument(skip(pool, token))]
pub async fn upsert_pending_contact(
    pool: &PgPool,
    email: &str,
    token: &str,
) -> Result<Contact, ContactStorageError> {
    let client = pool.get().await?;

    let query = format!(
        "INSERT INTO contacts (email, status, confirmation_token)
         VALUES ($1, 'pending', $2)
         ON CONFLICT (email) DO UPDATE
             SET status = 'pending',
                 confirmation_token = EXCLUDED.confirmation_token
         RETURNING {CONTACT_COLUMNS}"
    );

    let row = client.query_one(&query, &[&email, &token]).await?;
    map_contact(&row)
}

/// Atomic conditional activation: pending -> active, in one statement, so two
/// concurrent clicks on the same link cannot both pass the status check.
/// The token is deliberately left in place; it is cleared separately once the
/// analysis has been generated and delivered.
#[instrument(skip(pool, token))]
pub async fn activate_by_token(
    pool: &PgPool,
    token: &str,
) -> Result<TokenActivation, ContactStorageError> {
    let client = pool.get().await?;

    let update = format!(
        "UPDATE contacts
         SET status = 'active', confirmed_at = NOW()
         WHERE confirmation_token = $1 AND status = 'pending'
         RETURNING {CONTACT_COLUMNS}"
    );

    if let Some(row) = client.query_opt(&update, &[&token]).await? {
        return Ok(TokenActivation::Activated(map_contact(&row)?));
    }

    let select = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE confirmation_token = $1");
    match client.query_opt(&select, &[&token]).await? {
        Some(row) => {
            let contact = map_contact(&row)?;
            if contact.status == ContactStatus::Active {
                Ok(TokenActivation::AlreadyActive(contact))
            } else {
                // Lost a race against a concurrent failure revert; the link
                // is still usable, so report it as unknown for this attempt.
                Ok(TokenActivation::Unknown)
            }
        }
        None => Ok(TokenActivation::Unknown),
    }
}

/// Undo an activation after the LLM call or the results email failed, so the
/// user can retry by re-clicking the same link.
#[instrument(skip(pool))]
pub async fn revert_to_pending(pool: &PgPool, contact_id: i64) -> Result<(), ContactStorageError> {
    let client = pool.get().await?;
    client
        .execute(
            "UPDATE contacts
             SET status = 'pending', confirmed_at = NULL
             WHERE id = $1 AND status = 'active'",
            &[&contact_id],
        )
        .await?;
    Ok(())
}

/// Clear the confirmation token once analysis and delivery both succeeded.
#[instrument(skip(pool))]
pub async fn clear_confirmation_token(
    pool: &PgPool,
    contact_id: i64,
) -> Result<(), ContactStorageError> {
    let client = pool.get().await?;
    client
        .execute(
            "UPDATE contacts SET confirmation_token = NULL WHERE id = $1",
            &[&contact_id],
        )
        .await?;
    Ok(())
}

/// All contacts, newest first, annotated with their analysis count and the
/// timestamp of the most recent analysis.
#[instrument(skip(pool))]
pub async fn list_contact_summaries(
    pool: &PgPool,
) -> Result<Vec<ContactSummary>, ContactStorageError> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT c.id, c.email, c.status, c.created_at,
                    COUNT(a.id) AS analysis_count,
                    MAX(a.created_at) AS last_analysis_at
             FROM contacts c
             LEFT JOIN analyses a ON a.contact_id = c.id
             GROUP BY c.id, c.email, c.status, c.created_at
             ORDER BY c.created_at DESC, c.id DESC",
            &[],
        )
        .await?;

    rows.iter()
        .map(|row| {
            let status_raw: String = row.get("status");
            let status = ContactStatus::parse(&status_raw).ok_or_else(|| {
                ContactStorageError::Mapping(format!("unknown status: {status_raw}"))
            })?;

            Ok(ContactSummary {
                id: row.get("id"),
                email: row.get("email"),
                status,
                created_at: row.get("created_at"),
                analysis_count: row.get("analysis_count"),
                last_analysis_at: row.get::<_, Option<DateTime<Utc>>>("last_analysis_at"),
            })
        })
        .collect()
}

/// Delete a contact and everything it owns. Analyses go first inside the same
/// transaction; there is no ON DELETE CASCADE in the schema, the ordering
/// here is the referential cleanup.
#[instrument(skip(pool))]
pub async fn delete_contact_with_analyses(
    pool: &PgPool,
    email: &str,
) -> Result<u64, ContactStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_opt("SELECT id FROM contacts WHERE email = $1", &[&email])
        .await?;
    let Some(row) = row else {
        return Err(ContactStorageError::NotFound(email.to_string()));
    };
    let contact_id: i64 = row.get("id");

    let removed = tx
        .execute("DELETE FROM analyses WHERE contact_id = $1", &[&contact_id])
        .await?;
    tx.execute("DELETE FROM contacts WHERE id = $1", &[&contact_id])
        .await?;
    tx.commit().await?;

    Ok(removed)
}
