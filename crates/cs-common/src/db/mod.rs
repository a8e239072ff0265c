pub mod analyses;
pub mod contacts;
pub mod migrations;
pub mod pool;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use analyses::{
    complete_analysis, insert_pending_analysis, latest_pending_for_contact, revert_completion,
    AnalysisStorageError,
};
pub use contacts::{
    activate_by_token, clear_confirmation_token, delete_contact_with_analyses,
    list_contact_summaries, revert_to_pending, upsert_pending_contact, ContactStorageError,
    TokenActivation,
};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool_from_url, create_pool_from_url_checked, DbPoolError, PgPool};
