//! Shared test support. Compiled for this crate's own tests and, behind the
//! `test-util` feature, for downstream test suites.

use std::sync::Mutex;

static ENV_GUARD: Mutex<()> = Mutex::new(());

/// Run `f` with the given environment overrides applied, restoring the
/// previous values afterwards. A process-wide mutex keeps env-dependent
/// tests from interleaving.
pub fn with_env(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
    let _guard = ENV_GUARD.lock().unwrap();

    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, value)| {
            let old = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            (key.to_string(), old)
        })
        .collect();

    f();

    for (key, old) in previous {
        match old {
            Some(v) => std::env::set_var(&key, v),
            None => std::env::remove_var(&key),
        }
    }
}
