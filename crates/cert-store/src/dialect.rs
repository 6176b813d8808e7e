//! SQL dialect seam.
//!
//! The two supported backends differ in pagination syntax, boolean literals,
//! identifier case-folding and empty-string semantics. Query text goes
//! through here; the repository never embeds a dialect-specific fragment
//! directly.

use pkd_core::config::DbType;

/// Dialect-aware SQL fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    kind: DbType,
}

impl Dialect {
    /// Dialect for `kind`.
    pub fn new(kind: DbType) -> Self {
        Self { kind }
    }

    /// Backend kind.
    pub fn kind(&self) -> DbType {
        self.kind
    }

    /// Boolean literal.
    pub fn bool_lit(&self, value: bool) -> &'static str {
        match (self.kind, value) {
            (DbType::Postgres, true) => "TRUE",
            (DbType::Postgres, false) => "FALSE",
            (DbType::Oracle, true) => "1",
            (DbType::Oracle, false) => "0",
        }
    }

    /// Positional bind placeholder, 1-based.
    pub fn placeholder(&self, n: usize) -> String {
        match self.kind {
            DbType::Postgres => format!("${n}"),
            DbType::Oracle => format!(":{n}"),
        }
    }

    /// Unquoted identifiers fold to lowercase on postgres and uppercase on
    /// oracle; emitting the folded form keeps generated SQL stable under
    /// round-trips through each catalog.
    pub fn ident(&self, name: &str) -> String {
        match self.kind {
            DbType::Postgres => name.to_ascii_lowercase(),
            DbType::Oracle => name.to_ascii_uppercase(),
        }
    }

    /// Append pagination to a complete SELECT.
    pub fn paginate(&self, sql: &str, limit: u64, offset: u64) -> String {
        match self.kind {
            DbType::Postgres => format!("{sql} LIMIT {limit} OFFSET {offset}"),
            DbType::Oracle => {
                format!("{sql} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
        }
    }

    /// Oracle stores the empty string as NULL; normalize optional text on the
    /// way in so both backends agree on "absent".
    pub fn optional_text<'a>(&self, value: Option<&'a str>) -> Option<&'a str> {
        match value {
            Some("") => None,
            other => other,
        }
    }

    /// Expression stripping whitespace and lowercasing a column, used by the
    /// raw DN pre-filter. Both backends share the functions; only identifier
    /// folding differs.
    pub fn folded_dn_expr(&self, column: &str) -> String {
        format!("REPLACE(LOWER({}), ' ', '')", self.ident(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_fragments() {
        let d = Dialect::new(DbType::Postgres);
        assert_eq!(d.bool_lit(true), "TRUE");
        assert_eq!(d.placeholder(2), "$2");
        assert_eq!(d.ident("Subject_DN"), "subject_dn");
        assert_eq!(d.paginate("SELECT 1", 10, 20), "SELECT 1 LIMIT 10 OFFSET 20");
    }

    #[test]
    fn oracle_fragments() {
        let d = Dialect::new(DbType::Oracle);
        assert_eq!(d.bool_lit(false), "0");
        assert_eq!(d.placeholder(1), ":1");
        assert_eq!(d.ident("subject_dn"), "SUBJECT_DN");
        assert_eq!(
            d.paginate("SELECT 1", 10, 20),
            "SELECT 1 OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn empty_string_folds_to_null() {
        let d = Dialect::new(DbType::Oracle);
        assert_eq!(d.optional_text(Some("")), None);
        assert_eq!(d.optional_text(Some("x")), Some("x"));
        assert_eq!(d.optional_text(None), None);
        // Postgres path keeps the same normalization for cross-backend parity.
        let p = Dialect::new(DbType::Postgres);
        assert_eq!(p.optional_text(Some("")), None);
    }

    #[test]
    fn folded_dn_expr_folds_identifier_per_dialect() {
        assert_eq!(
            Dialect::new(DbType::Postgres).folded_dn_expr("subject_dn"),
            "REPLACE(LOWER(subject_dn), ' ', '')"
        );
        assert_eq!(
            Dialect::new(DbType::Oracle).folded_dn_expr("subject_dn"),
            "REPLACE(LOWER(SUBJECT_DN), ' ', '')"
        );
    }
}
