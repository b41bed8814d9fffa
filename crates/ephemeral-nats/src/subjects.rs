//! NATS subject patterns for the ephemeral roles side channel
//!
//! Subject pattern: `ephemeral-roles.{prefix}.{area}.{action}`
//!
//! Log level:
//! - `ephemeral-roles.{prefix}.log_level.current` (published every interval)
//! - `ephemeral-roles.{prefix}.log_level.set` (request/reply)

/// Subject builders for runtime log level control
pub mod log_level {
    /// Current level, published by the running bot
    pub fn current(prefix: &str) -> String {
        format!("ephemeral-roles.{}.log_level.current", prefix)
    }

    /// Level change requests, answered by the running bot
    pub fn set(prefix: &str) -> String {
        format!("ephemeral-roles.{}.log_level.set", prefix)
    }

    /// Wildcard for every log level subject
    pub fn all(prefix: &str) -> String {
        format!("ephemeral-roles.{}.log_level.>", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_subjects() {
        assert_eq!(
            log_level::current("prod"),
            "ephemeral-roles.prod.log_level.current"
        );
        assert_eq!(log_level::set("prod"), "ephemeral-roles.prod.log_level.set");
        assert_eq!(log_level::all("prod"), "ephemeral-roles.prod.log_level.>");
    }

    #[test]
    fn test_prefix_substitution() {
        assert_eq!(
            log_level::set("staging"),
            "ephemeral-roles.staging.log_level.set"
        );
    }

    #[test]
    fn test_wildcard_covers_subjects() {
        let all = log_level::all("dev");
        let stem = all.trim_end_matches('>');
        for s in [log_level::current("dev"), log_level::set("dev")] {
            assert!(s.starts_with(stem), "{} not under {}", s, all);
        }
    }
}
