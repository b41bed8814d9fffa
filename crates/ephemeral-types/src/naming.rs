//! Managed role naming
//!
//! Ephemeral roles are identified by name only: `{prefix} {channel name}`.
//! The derived name is the uniqueness key for role creation.

/// Derive the managed role name for a channel.
///
/// - prefix `{eph}`, channel `General` → `{eph} General`
pub fn role_name(prefix: &str, channel_name: &str) -> String {
    format!("{} {}", prefix, channel_name)
}

/// True if `role_name` was derived with `prefix`.
pub fn is_managed(prefix: &str, role_name: &str) -> bool {
    role_name
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(' '))
}
