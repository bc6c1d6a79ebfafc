use std::{env, fmt::Display, str::FromStr};

use log::{info, warn};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads and parses an environment variable. Missing values fall back to `default` silently (with an info log);
/// unparseable values fall back with a warning.
pub fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name}: '{s}'. {e}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn env_values() {
        env::set_var("LMS_COMMON_TEST_PORT", "8080");
        env::set_var("LMS_COMMON_TEST_BAD_PORT", "eighty");
        assert_eq!(env_or_default("LMS_COMMON_TEST_PORT", 1u16), 8080);
        assert_eq!(env_or_default("LMS_COMMON_TEST_BAD_PORT", 1u16), 1);
        assert_eq!(env_or_default("LMS_COMMON_TEST_UNSET", 7u64), 7);
    }
}
