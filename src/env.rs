//! Environment variable names read by [`ConfigLoader`](crate::config::ConfigLoader).
//!
//! These are helpers only; [`LogConfig`](crate::config::LogConfig) itself
//! never touches the environment.

/// Service name, checked before [`APP_NAME_ENV`].
pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";

/// Fallback service name.
pub const APP_NAME_ENV: &str = "APP_NAME";

/// Environment selectors, checked in this order; the first non-empty wins.
pub const ENV_SELECTORS: [&str; 4] = ["ENV", "APP_ENV", "RUST_ENV", "MODE"];

/// Overrides the configured minimum level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Overrides the configured log directory.
pub const LOG_DIR_ENV: &str = "LOG_DIR";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    non_empty(key).unwrap_or_else(|| default.to_string())
}

/// Value of `key` when set to something other than the empty string.
pub fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Current environment name; `dev` when nothing is set.
pub fn detect_env() -> String {
    ENV_SELECTORS
        .iter()
        .find_map(|key| non_empty(key))
        .unwrap_or_else(|| "dev".to_string())
}

/// Service name from the environment, the executable name or the working
/// directory, in that order; `service` if none of them gives a usable name.
pub fn detect_service_name() -> String {
    if let Some(name) = non_empty(SERVICE_NAME_ENV).or_else(|| non_empty(APP_NAME_ENV)) {
        return name;
    }

    let from_exe = std::env::current_exe().ok().and_then(|path| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty() && name != "main")
    });
    if let Some(name) = from_exe {
        return name;
    }

    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "service".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_selectors_are_checked_in_order() {
        temp_env::with_vars(
            [("ENV", None), ("APP_ENV", Some("staging")), ("RUST_ENV", Some("prod")), ("MODE", None)],
            || assert_eq!(detect_env(), "staging"),
        );
        temp_env::with_vars(
            [("ENV", None::<&str>), ("APP_ENV", None), ("RUST_ENV", None), ("MODE", None)],
            || assert_eq!(detect_env(), "dev"),
        );
    }

    #[test]
    fn service_name_prefers_environment() {
        temp_env::with_vars([("SERVICE_NAME", Some("billing")), ("APP_NAME", Some("other"))], || {
            assert_eq!(detect_service_name(), "billing")
        });
        temp_env::with_vars([("SERVICE_NAME", None), ("APP_NAME", Some("other"))], || {
            assert_eq!(detect_service_name(), "other")
        });
    }

    #[test]
    fn env_or_ignores_empty_values() {
        temp_env::with_var("LOG_FACADE_TEST_EMPTY", Some(""), || {
            assert_eq!(env_or("LOG_FACADE_TEST_EMPTY", "fallback"), "fallback")
        });
    }
}
