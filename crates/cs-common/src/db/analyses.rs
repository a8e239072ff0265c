use deadpool_postgres::PoolError;
use tokio_postgres::{Error as PgError, Row};
use tracing::instrument;

use crate::db::PgPool;
use crate::model::{Analysis, AnalysisStatus};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map analysis row: {0}")]
    Mapping(String),
}

const ANALYSIS_COLUMNS: &str = "id, contact_id, situation, analysis, status, created_at";

fn map_analysis(row: &Row) -> Result<Analysis, AnalysisStorageError> {
    let status_raw: String = row.get("status");
    let status = AnalysisStatus::parse(&status_raw)
        .ok_or_else(|| AnalysisStorageError::Mapping(format!("unknown status: {status_raw}")))?;

    Ok(Analysis {
        id: row.get("id"),
        contact_id: row.get("contact_id"),
        situation: row.get("situation"),
        analysis: row.get("analysis"),
        status,
        created_at: row.get("created_at"),
    })
}

/// Record a submission. The result text stays NULL until confirmation
/// triggers generation.
#[instrument(skip(pool, situation))]
pub async fn insert_pending_analysis(
    pool: &PgPool,
    contact_id: i64,
    situation: &str,
) -> Result<Analysis, AnalysisStorageError> {
    let client = pool.get().await?;

    let query = format!(
        "INSERT INTO analyses (contact_id, situation, analysis, status)
         VALUES ($1, $2, NULL, 'pending')
         RETURNING {ANALYSIS_COLUMNS}"
    );

    let row = client.query_one(&query, &[&contact_id, &situation]).await?;
    map_analysis(&row)
}

/// The contact's most recent pending analysis, if any. When several
/// submissions pile up before confirmation, the newest one wins.
#[instrument(skip(pool))]
pub async fn latest_pending_for_contact(
    pool: &PgPool,
    contact_id: i64,
) -> Result<Option<Analysis>, AnalysisStorageError> {
    let client = pool.get().await?;

    let query = format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analyses
         WHERE contact_id = $1 AND status = 'pending'
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    );

    let row = client.query_opt(&query, &[&contact_id]).await?;
    row.as_ref().map(map_analysis).transpose()
}

/// Store the generated text and flip the analysis to completed. Conditional
/// on still being pending, so a racing duplicate confirmation cannot
/// overwrite a delivered result. Returns the number of rows claimed.
#[instrument(skip(pool, text))]
pub async fn complete_analysis(
    pool: &PgPool,
    analysis_id: i64,
    text: &str,
) -> Result<u64, AnalysisStorageError> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE analyses
             SET analysis = $2, status = 'completed'
             WHERE id = $1 AND status = 'pending'",
            &[&analysis_id, &text],
        )
        .await?;
    Ok(rows)
}

/// Roll a completed analysis back to pending after delivery failed, dropping
/// the generated text so the completed-iff-non-null invariant holds and a
/// re-click regenerates it.
#[instrument(skip(pool))]
pub async fn revert_completion(
    pool: &PgPool,
    analysis_id: i64,
) -> Result<(), AnalysisStorageError> {
    let client = pool.get().await?;
    client
        .execute(
            "UPDATE analyses
             SET analysis = NULL, status = 'pending'
             WHERE id = $1",
            &[&analysis_id],
        )
        .await?;
    Ok(())
}
