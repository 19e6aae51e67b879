//! Identifier derivation
//!
//! Turns a human slug into schema and role names that are safe to use as
//! PostgreSQL identifiers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a derived name, below PostgreSQL's 63 byte limit
pub const MAX_IDENTIFIER_LEN: usize = 60;

/// Prefix of derived schema names
pub const SCHEMA_PREFIX: &str = "t_";

/// Prefix of derived role names
pub const ROLE_PREFIX: &str = "u_";

static INVALID_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());

fn derive(prefix: &str, slug: &str) -> String {
    let lowered = slug.to_ascii_lowercase();
    let mut name = String::with_capacity(prefix.len() + lowered.len());
    name.push_str(prefix);
    name.push_str(&INVALID_RUN.replace_all(&lowered, "_"));
    // Only ASCII remains, so byte truncation is safe.
    name.truncate(MAX_IDENTIFIER_LEN);
    name
}

/// Schema name for a slug
///
/// # Examples
///
/// ```
/// use pgtenancy::naming::schema_name;
///
/// assert_eq!(schema_name("Acme Corp"), "t_acme_corp");
/// assert_eq!(schema_name("2024-q1"), "t_2024_q1");
/// ```
pub fn schema_name(slug: &str) -> String {
    derive(SCHEMA_PREFIX, slug)
}

/// Role name for a slug
///
/// # Examples
///
/// ```
/// use pgtenancy::naming::role_name;
///
/// assert_eq!(role_name("acme.io"), "u_acme_io");
/// ```
pub fn role_name(slug: &str) -> String {
    derive(ROLE_PREFIX, slug)
}

/// Whether `name` is an unquoted-safe lower-case identifier.
///
/// Used to check explicitly supplied schema names.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Whether `name` is the shared `public` schema or a system schema.
///
/// Tenants never own these, even when supplied explicitly.
///
/// # Examples
///
/// ```
/// use pgtenancy::naming::is_reserved_schema;
///
/// assert!(is_reserved_schema("public"));
/// assert!(is_reserved_schema("pg_catalog"));
/// assert!(!is_reserved_schema("t_acme"));
/// ```
pub fn is_reserved_schema(name: &str) -> bool {
    name == "public" || name == "information_schema" || name.starts_with("pg_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(schema_name("acme"), "t_acme");
        assert_eq!(role_name("acme"), "u_acme");
    }

    #[test]
    fn test_invalid_runs_collapse() {
        assert_eq!(schema_name("a--b  c"), "t_a_b_c");
        assert_eq!(schema_name("Ünïcode"), "t__n_code");
        assert_eq!(role_name("x'; DROP ROLE postgres; --"), "u_x_drop_role_postgres_");
    }

    #[test]
    fn test_truncated_to_limit() {
        let slug = "a".repeat(200);
        let name = schema_name(&slug);
        assert_eq!(name.len(), MAX_IDENTIFIER_LEN);
        assert!(name.starts_with("t_aaa"));
    }

    #[test]
    fn test_deterministic() {
        for slug in ["acme", "Big Co", "ünï", "42"] {
            assert_eq!(schema_name(slug), schema_name(slug));
            assert_eq!(role_name(slug), role_name(slug));
        }
    }

    #[test]
    fn test_output_is_valid_identifier() {
        for slug in ["acme", "Big Co", "9lives", "a.b.c", "___", "ÆØÅ"] {
            assert!(is_valid_identifier(&schema_name(slug)), "{slug}");
            assert!(is_valid_identifier(&role_name(slug)), "{slug}");
        }
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("tenant_acme"));
        assert!(!is_valid_identifier("1tenant"));
        assert!(!is_valid_identifier("Tenant"));
        assert!(!is_valid_identifier("acme;drop"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_reserved_schemas() {
        for name in ["public", "information_schema", "pg_catalog", "pg_toast", "pg_anything"] {
            assert!(is_reserved_schema(name), "{name}");
        }
        for name in ["t_public", "publicity", "tenant_pg_", "t_pg_acme"] {
            assert!(!is_reserved_schema(name), "{name}");
        }
    }

    #[test]
    fn test_derived_schema_is_never_reserved() {
        for slug in ["public", "pg_catalog", "information_schema"] {
            assert!(!is_reserved_schema(&schema_name(slug)), "{slug}");
        }
    }
}
