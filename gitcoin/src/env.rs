//! Helpers for reading configuration from environment variables.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::tracing::prelude::*;

/// Read `name` and parse it, falling back to `default` when unset.
///
/// A value that is set but does not parse is logged and ignored, so a typo
/// never prevents the daemon from starting.
pub fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(var = name, value = %raw, error = %e, "Ignoring invalid value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Read `name` as a string, falling back to `default` when unset or empty.
pub fn string_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_or_falls_back_on_garbage() {
        env::set_var("GITCOIN_TEST_NUMBER", "12");
        assert_eq!(parse_or("GITCOIN_TEST_NUMBER", 5u32), 12);

        env::set_var("GITCOIN_TEST_NUMBER", "twelve");
        assert_eq!(parse_or("GITCOIN_TEST_NUMBER", 5u32), 5);

        env::remove_var("GITCOIN_TEST_NUMBER");
        assert_eq!(parse_or("GITCOIN_TEST_NUMBER", 5u32), 5);
    }

    #[test]
    #[serial]
    fn test_string_or_ignores_empty() {
        env::set_var("GITCOIN_TEST_STRING", "  ");
        assert_eq!(string_or("GITCOIN_TEST_STRING", "fallback"), "fallback");

        env::set_var("GITCOIN_TEST_STRING", "value");
        assert_eq!(string_or("GITCOIN_TEST_STRING", "fallback"), "value");
        env::remove_var("GITCOIN_TEST_STRING");
    }
}
