pub mod analyze;
pub mod confirm;
pub mod contacts;
pub mod health;
