// restoretool/src/restore/scope.rs
//! Privilege scope resolution against the target database catalog.
//!
//! The scope is the set of qualified table names the connecting role may
//! write to. It is resolved against the *target* database, not the dump:
//! a preview/branch database often grants a narrower surface than the
//! instance the dump came from.

use anyhow::{Context, Result};
use sqlx::{Pool, Postgres};
use std::collections::BTreeSet;

use crate::config::RestoreConfig;
use crate::errors::RestoreError;
use crate::utils::names::{is_system_schema, normalize_qualified_name, schema_of};

/// Conservative fallback when the auth catalog query fails or comes back
/// empty: the one auth table every deployment has.
pub const AUTH_FALLBACK_TABLE: &str = "auth.users";

/// Migrations bookkeeping table that is always restorable in auth mode.
pub const MIGRATIONS_TABLE: &str = "supabase_migrations.schema_migrations";

/// Tables in schema `auth` the current role can INSERT into. Identifier
/// quoting is done by the server's own format('%I.%I', ...), never by
/// string concatenation here.
const AUTH_INSERTABLE_QUERY: &str = r#"
    SELECT n.nspname || '.' || c.relname AS table_name
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = 'auth'
      AND c.relkind IN ('r', 'p')
      AND has_table_privilege(current_user, format('%I.%I', n.nspname, c.relname), 'INSERT')
    ORDER BY 1
"#;

/// Every table outside system namespaces the current role can INSERT into.
const ALL_INSERTABLE_QUERY: &str = r#"
    SELECT n.nspname || '.' || c.relname AS table_name
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND n.nspname NOT LIKE 'pg_toast%'
      AND n.nspname NOT LIKE 'pg_temp_%'
      AND has_table_privilege(current_user, format('%I.%I', n.nspname, c.relname), 'INSERT')
    ORDER BY 1
"#;

/// The two mutually exclusive scope policies for one restore run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeMode {
    /// Explicit allowlist of `auth.*` tables, plus the implicit blanket
    /// allowance for `public.*` and the migrations table.
    AuthAllowlist(BTreeSet<String>),
    /// Exhaustive set of insertable tables; nothing is implicitly allowed.
    AllInsertable(BTreeSet<String>),
}

impl ScopeMode {
    /// Membership test for a normalized COPY target table.
    pub fn allows_copy_target(&self, table: &str) -> bool {
        match self {
            ScopeMode::AllInsertable(tables) => tables.contains(table),
            ScopeMode::AuthAllowlist(auth_tables) => {
                if table.starts_with("public.") || table == MIGRATIONS_TABLE {
                    return true;
                }
                table.starts_with("auth.") && auth_tables.contains(table)
            }
        }
    }

    /// Membership test for the normalized sequence literal of a
    /// `pg_catalog.setval` statement. Sequences are not tables, so the
    /// test works on the schema prefix rather than exact membership.
    pub fn allows_setval_target(&self, sequence: &str) -> bool {
        let Some(schema) = schema_of(sequence) else {
            return false;
        };
        match self {
            ScopeMode::AllInsertable(tables) => {
                !is_system_schema(schema)
                    && tables.iter().any(|t| schema_of(t) == Some(schema))
            }
            ScopeMode::AuthAllowlist(auth_tables) => {
                if schema == "public" || schema == "supabase_migrations" {
                    return true;
                }
                if schema != "auth" {
                    return false;
                }
                // auth.users_id_seq is allowed when auth.users is in scope.
                let relation = &sequence[schema.len() + 1..];
                auth_tables.iter().any(|t| {
                    t.strip_prefix("auth.")
                        .is_some_and(|table| relation.starts_with(&format!("{}_", table)))
                })
            }
        }
    }
}

/// Outcome of scope resolution. `Degraded` means the auth catalog query
/// could not be used and the conservative single-table fallback applies;
/// callers can branch on this without string-matching error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeResolution {
    Full(ScopeMode),
    Degraded { scope: ScopeMode, reason: String },
}

impl ScopeResolution {
    pub fn scope(&self) -> &ScopeMode {
        match self {
            ScopeResolution::Full(scope) => scope,
            ScopeResolution::Degraded { scope, .. } => scope,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ScopeResolution::Degraded { .. })
    }
}

/// Builds an auth-allowlist scope from an explicit override list.
/// Entries outside the `auth` schema are discarded; this mode's implicit
/// public/migrations allowance covers them already.
pub fn auth_scope_from_override(entries: &[String]) -> ScopeMode {
    let tables = entries
        .iter()
        .map(|e| normalize_qualified_name(e))
        .filter(|e| e.starts_with("auth."))
        .collect();
    ScopeMode::AuthAllowlist(tables)
}

/// Builds an all-insertable scope from an explicit override list. Every
/// entry is kept as-is after normalization; membership is exact.
pub fn all_insertable_scope_from_override(entries: &[String]) -> ScopeMode {
    ScopeMode::AllInsertable(entries.iter().map(|e| normalize_qualified_name(e)).collect())
}

fn auth_fallback_scope() -> ScopeMode {
    ScopeMode::AuthAllowlist(BTreeSet::from([AUTH_FALLBACK_TABLE.to_string()]))
}

/// Resolves the table scope for one restore request. An explicit override
/// list bypasses the catalog entirely, so override-driven runs are
/// deterministic and issue no network call.
pub async fn resolve_table_scope(config: &RestoreConfig) -> Result<ScopeResolution> {
    if let Some(entries) = &config.table_scope_override {
        let scope = if config.use_all_insertable_scope {
            all_insertable_scope_from_override(entries)
        } else {
            auth_scope_from_override(entries)
        };
        return Ok(ScopeResolution::Full(scope));
    }

    if config.use_all_insertable_scope {
        resolve_all_insertable(config).await
    } else {
        Ok(resolve_auth_allowlist(config).await)
    }
}

/// Auth-allowlist resolution degrades to `{auth.users}` on any failure or
/// an empty result: restoring something safe beats aborting the run.
async fn resolve_auth_allowlist(config: &RestoreConfig) -> ScopeResolution {
    match query_insertable_tables(config, AUTH_INSERTABLE_QUERY).await {
        Ok(tables) if !tables.is_empty() => {
            ScopeResolution::Full(ScopeMode::AuthAllowlist(tables))
        }
        Ok(_) => ScopeResolution::Degraded {
            scope: auth_fallback_scope(),
            reason: "catalog query found no insertable auth tables".to_string(),
        },
        Err(e) => ScopeResolution::Degraded {
            scope: auth_fallback_scope(),
            reason: format!("auth catalog query failed: {:#}", e),
        },
    }
}

/// All-insertable resolution is fatal on failure or an empty result:
/// this mode is requested precisely because the default scope is too
/// narrow, so there is no safe fallback.
async fn resolve_all_insertable(config: &RestoreConfig) -> Result<ScopeResolution> {
    let tables = query_insertable_tables(config, ALL_INSERTABLE_QUERY)
        .await
        .context("Failed to resolve all-insertable table scope against target database")?;
    if tables.is_empty() {
        return Err(RestoreError::ScopeResolution(
            "all-insertable scope query returned no tables; the connecting role cannot write anywhere"
                .to_string(),
        )
        .into());
    }
    Ok(ScopeResolution::Full(ScopeMode::AllInsertable(tables)))
}

async fn query_insertable_tables(
    config: &RestoreConfig,
    query: &str,
) -> Result<BTreeSet<String>> {
    let pool = Pool::<Postgres>::connect(&config.target_db_url)
        .await
        .context("Failed to connect to target database for scope resolution")?;

    let rows: Vec<String> = sqlx::query_scalar(query)
        .fetch_all(&pool)
        .await
        .context("Failed to query insertable tables from target catalog")?;

    pool.close().await;
    Ok(rows.iter().map(|r| normalize_qualified_name(r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_scope(tables: &[&str]) -> ScopeMode {
        ScopeMode::AuthAllowlist(tables.iter().map(|t| t.to_string()).collect())
    }

    fn all_scope(tables: &[&str]) -> ScopeMode {
        ScopeMode::AllInsertable(tables.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_auth_mode_implicit_public_and_migrations_allowance() {
        let scope = auth_scope(&["auth.users"]);
        assert!(scope.allows_copy_target("public.projects"));
        assert!(scope.allows_copy_target("supabase_migrations.schema_migrations"));
        assert!(scope.allows_copy_target("auth.users"));
        assert!(!scope.allows_copy_target("auth.sso_domains"));
        assert!(!scope.allows_copy_target("storage.objects"));
    }

    #[test]
    fn test_all_insertable_mode_is_exact_membership() {
        let scope = all_scope(&["public.projects", "storage.objects"]);
        assert!(scope.allows_copy_target("storage.objects"));
        assert!(scope.allows_copy_target("public.projects"));
        // No implicit public allowance in this mode.
        assert!(!scope.allows_copy_target("public.other"));
        assert!(!scope.allows_copy_target("supabase_migrations.schema_migrations"));
    }

    #[test]
    fn test_setval_auth_mode_schema_prefix_policy() {
        let scope = auth_scope(&["auth.users"]);
        assert!(scope.allows_setval_target("public.projects_id_seq"));
        assert!(scope.allows_setval_target("supabase_migrations.schema_migrations_version_seq"));
        assert!(scope.allows_setval_target("auth.users_id_seq"));
        assert!(!scope.allows_setval_target("auth.sso_domains_id_seq"));
        assert!(!scope.allows_setval_target("storage.objects_id_seq"));
        assert!(!scope.allows_setval_target("unqualified_seq"));
    }

    #[test]
    fn test_setval_all_insertable_mode_excludes_system_schemas() {
        let scope = all_scope(&["public.projects", "pgsodium.key"]);
        assert!(scope.allows_setval_target("public.projects_id_seq"));
        assert!(scope.allows_setval_target("pgsodium.key_id_seq"));
        assert!(!scope.allows_setval_target("pg_catalog.some_seq"));
        assert!(!scope.allows_setval_target("information_schema.some_seq"));
        assert!(!scope.allows_setval_target("pg_toast.some_seq"));
        // Non-system schema with no scoped tables is still denied.
        assert!(!scope.allows_setval_target("storage.objects_id_seq"));
    }

    #[test]
    fn test_auth_override_keeps_only_auth_entries() {
        let scope = auth_scope_from_override(&[
            "auth.users".to_string(),
            "public.projects".to_string(),
        ]);
        assert_eq!(scope, auth_scope(&["auth.users"]));
    }

    #[test]
    fn test_override_entries_are_normalized() {
        let scope = auth_scope_from_override(&["\"Auth\".\"Users\";".to_string()]);
        assert_eq!(scope, auth_scope(&["auth.users"]));

        let scope = all_insertable_scope_from_override(&["\"Public\".\"Projects\"".to_string()]);
        assert_eq!(scope, all_scope(&["public.projects"]));
    }

    #[test]
    fn test_resolution_accessors_distinguish_degraded() {
        let full = ScopeResolution::Full(auth_scope(&["auth.users"]));
        assert!(!full.is_degraded());

        let degraded = ScopeResolution::Degraded {
            scope: auth_fallback_scope(),
            reason: "connection refused".to_string(),
        };
        assert!(degraded.is_degraded());
        assert!(degraded.scope().allows_copy_target(AUTH_FALLBACK_TABLE));
    }

    #[tokio::test]
    async fn test_override_bypasses_catalog_query() -> anyhow::Result<()> {
        // The target URL points nowhere; resolution must still succeed
        // because an override never touches the network.
        let config = RestoreConfig {
            target_db_url: "postgres://nobody@127.0.0.1:1/unreachable".to_string(),
            backup_file_path: "backup.sql".to_string(),
            use_all_insertable_scope: false,
            table_scope_override: Some(vec![
                "auth.users".to_string(),
                "public.projects".to_string(),
            ]),
            clean_first: false,
            no_owner: true,
            single_transaction: false,
            parallel_jobs: 1,
        };
        let resolution = resolve_table_scope(&config).await?;
        assert!(!resolution.is_degraded());
        assert_eq!(resolution.scope(), &auth_scope(&["auth.users"]));
        Ok(())
    }
}
