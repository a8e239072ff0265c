pub mod db;
pub mod llm;
pub mod logging;
pub mod mail;
pub mod model;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod token;
pub mod validate;
