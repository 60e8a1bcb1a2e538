mod net;
mod trace;

pub use net::{bind_listener, shutdown_signal};
pub use trace::{init_tracing, TracingGuards};

use std::{env, str::FromStr};

/// Parses a typed environment value, falling back to the default when the
/// variable is unset or does not parse.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::env_or;

    #[test]
    fn falls_back_when_unset() {
        assert_eq!(env_or("SIDEREA_TEST_UNSET_VALUE", 42u16), 42);
    }

    #[test]
    fn falls_back_on_parse_failure() {
        std::env::set_var("SIDEREA_TEST_BAD_VALUE", "not-a-number");
        assert_eq!(env_or("SIDEREA_TEST_BAD_VALUE", 7u64), 7);
    }

    #[test]
    fn reads_parsable_values() {
        std::env::set_var("SIDEREA_TEST_GOOD_VALUE", "9090");
        assert_eq!(env_or("SIDEREA_TEST_GOOD_VALUE", 0u16), 9090);
    }
}
