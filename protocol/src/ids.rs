//! Prefixed identifiers (`resp_…`, `hoff_…`, `evt_…`).

use uuid::Uuid;

/// Prefix for outcome response ids.
pub const RESPONSE_PREFIX: &str = "resp";
/// Prefix for handoff ids.
pub const HANDOFF_PREFIX: &str = "hoff";
/// Prefix for conversion event ids.
pub const EVENT_PREFIX: &str = "evt";

/// Generate `<prefix>_<12 hex chars>` from a fresh v4 UUID.
pub fn prefixed_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_id_shape() {
        let id = prefixed_id(RESPONSE_PREFIX);
        assert!(id.starts_with("resp_"));
        assert_eq!(id.len(), "resp_".len() + 12);
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_prefixed_ids_are_unique() {
        assert_ne!(prefixed_id(EVENT_PREFIX), prefixed_id(EVENT_PREFIX));
    }
}
