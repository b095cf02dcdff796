// restoretool/src/utils/names.rs
//! Qualified-name normalization and dump statement classification.
//!
//! A qualified table name is always handled in its normalized form:
//! lower-cased, quote characters stripped, trailing statement terminator
//! removed. Scope membership is tested against this form only.

use std::sync::OnceLock;

use regex::Regex;

/// Normalizes a `schema.table` (or `schema.sequence`) identifier.
pub fn normalize_qualified_name(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(';')
        .replace('"', "")
        .to_lowercase()
}

/// Splits a normalized qualified name into its schema part, if present.
pub fn schema_of(qualified: &str) -> Option<&str> {
    qualified.split_once('.').map(|(schema, _)| schema)
}

/// System namespaces that never receive restored data.
pub fn is_system_schema(schema: &str) -> bool {
    schema == "pg_catalog"
        || schema == "information_schema"
        || schema.starts_with("pg_toast")
        || schema.starts_with("pg_temp_")
}

/// Extracts the target table from a `COPY <schema>.<table> (...) FROM stdin;`
/// statement line, normalized. Returns `None` for any other line shape.
pub fn copy_target_table(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let head = trimmed.get(..5)?;
    if !head.eq_ignore_ascii_case("COPY ") {
        return None;
    }
    let rest = trimmed[5..].trim_start();
    let token: String = rest
        .chars()
        .take_while(|c| *c != ' ' && *c != '\t' && *c != '(')
        .collect();
    if token.is_empty() {
        return None;
    }
    Some(normalize_qualified_name(&token))
}

fn setval_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^\s*SELECT\s+pg_catalog\.setval\s*\(\s*'([^']+)'"#)
            .expect("setval statement pattern is valid")
    })
}

/// Extracts the quoted sequence literal from a
/// `SELECT pg_catalog.setval('<schema>.<sequence>', ...);` line, normalized.
pub fn setval_sequence_target(line: &str) -> Option<String> {
    setval_regex()
        .captures(line)
        .map(|caps| normalize_qualified_name(&caps[1]))
}

/// Guard metacommands emitted by newer dump tools. They block subsequent
/// statements when the script is replayed by a generic SQL client, so the
/// preprocessor drops them unconditionally.
pub fn is_guard_metacommand(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("\\restrict") || trimmed.starts_with("\\unrestrict")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_quotes_case_and_terminator() {
        assert_eq!(normalize_qualified_name("\"Public\".\"Users\""), "public.users");
        assert_eq!(normalize_qualified_name("auth.users;"), "auth.users");
        assert_eq!(normalize_qualified_name("  public.sessions  "), "public.sessions");
    }

    #[test]
    fn test_copy_target_table_is_idempotent_across_quoting() {
        let quoted = copy_target_table("COPY \"Public\".\"Users\" (id) FROM stdin;");
        let plain = copy_target_table("COPY public.users (id) FROM stdin;");
        assert_eq!(quoted, Some("public.users".to_string()));
        assert_eq!(quoted, plain);
    }

    #[test]
    fn test_copy_target_table_truncates_at_paren_without_space() {
        assert_eq!(
            copy_target_table("COPY public.users(id, email) FROM stdin;"),
            Some("public.users".to_string())
        );
    }

    #[test]
    fn test_copy_target_table_ignores_non_copy_lines() {
        assert_eq!(copy_target_table("SELECT 99;"), None);
        assert_eq!(copy_target_table("-- COPY public.users"), None);
        assert_eq!(copy_target_table("COPYCAT public.users"), None);
    }

    #[test]
    fn test_setval_sequence_target_extracts_literal() {
        let line = "SELECT pg_catalog.setval('public.users_id_seq', 42, true);";
        assert_eq!(setval_sequence_target(line), Some("public.users_id_seq".to_string()));
        assert_eq!(setval_sequence_target("SELECT 99;"), None);
    }

    #[test]
    fn test_setval_sequence_target_normalizes_quoted_literal() {
        let line = "SELECT pg_catalog.setval('\"Public\".\"Users_id_seq\"', 7, false);";
        assert_eq!(setval_sequence_target(line), Some("public.users_id_seq".to_string()));
    }

    #[test]
    fn test_guard_metacommand_detection() {
        assert!(is_guard_metacommand("\\restrict xyzzy"));
        assert!(is_guard_metacommand("  \\unrestrict xyzzy"));
        assert!(!is_guard_metacommand("\\. "));
        assert!(!is_guard_metacommand("SELECT 1;"));
    }

    #[test]
    fn test_system_schema_classification() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("information_schema"));
        assert!(is_system_schema("pg_toast"));
        assert!(is_system_schema("pg_toast_temp_1"));
        assert!(is_system_schema("pg_temp_3"));
        assert!(!is_system_schema("public"));
        assert!(!is_system_schema("auth"));
    }
}
