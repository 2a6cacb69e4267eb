//! Prefixed ID generation for paygate entities.
//!
//! All IDs use a `pg_` brand prefix so they can never collide with
//! provider-assigned identifiers (invoice IDs, payment IDs, etc.).
//!
//! Format: `pg_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["pg_sess_", "pg_ord_"];

/// Validate that a string is a valid paygate prefixed ID.
///
/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Session,
    Order,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Session => "pg_sess",
            Self::Order => "pg_ord",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::Session.gen_id();
        assert!(id.starts_with("pg_sess_"));
        // pg_sess_ (8 chars) + 32 hex chars
        assert_eq!(id.len(), 40);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(EntityType::Order.gen_id(), EntityType::Order.gen_id());
    }

    #[test]
    fn test_is_valid_prefixed_id() {
        assert!(is_valid_prefixed_id(&EntityType::Session.gen_id()));
        assert!(is_valid_prefixed_id(&EntityType::Order.gen_id()));

        assert!(!is_valid_prefixed_id(""));
        assert!(!is_valid_prefixed_id("a1b2c3d4-e5f6-7890-1234-567890123456"));
        assert!(!is_valid_prefixed_id("pg_unknown_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_prefixed_id("pg_sess_a1b2c3d4"));
        assert!(!is_valid_prefixed_id("pg_sess_a1b2c3d4e5f6789012345678901234gg"));
    }
}
