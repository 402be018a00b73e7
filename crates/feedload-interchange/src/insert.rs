//! Insert statements built from feed headers

use std::collections::HashSet;

use feedload_core::{FeedloadError, Identifier, IdentifierPolicy, Params, Result, Statement, Value};

use crate::reader::FeedRow;

/// Marker bound to the feed id in every insert
pub const FEED_MARKER: &str = ":feed";

/// Parameterized insert for one (table, header) pair.
///
/// The SQL text is built once per file. Identifiers are validated and quoted,
/// and markers are positional (`:c0`, `:c1`, ...) so no header text ever ends up
/// in a marker name.
#[derive(Debug, Clone)]
pub struct InsertTemplate {
    sql: String,
    markers: Vec<String>,
}

impl InsertTemplate {
    /// Build the insert for `headers` into `table`, prefixed by `feed_column`.
    ///
    /// Fails if a header is not a valid identifier, appears twice, or names the
    /// feed column itself. SQLite compares column names case-insensitively, so
    /// duplicates are detected the same way.
    pub fn new(
        table: &Identifier,
        feed_column: &Identifier,
        headers: &[String],
        policy: IdentifierPolicy,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(headers.len() + 1);
        seen.insert(feed_column.as_str().to_ascii_lowercase());

        let mut columns = Vec::with_capacity(headers.len() + 1);
        columns.push(feed_column.quoted());

        for header in headers {
            let column = Identifier::parse(header, policy)?;
            if !seen.insert(column.as_str().to_ascii_lowercase()) {
                let reason = if column.as_str().eq_ignore_ascii_case(feed_column.as_str()) {
                    "collides with the feed column"
                } else {
                    "duplicate column in header"
                };
                return Err(FeedloadError::Identifier {
                    name: header.clone(),
                    reason: reason.to_string(),
                });
            }
            columns.push(column.quoted());
        }

        let markers: Vec<String> = (0..headers.len()).map(|idx| format!(":c{idx}")).collect();
        let placeholders = std::iter::once(FEED_MARKER.to_string())
            .chain(markers.iter().cloned())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders
        );

        Ok(Self { sql, markers })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of header columns (the feed column excluded)
    pub fn column_count(&self) -> usize {
        self.markers.len()
    }

    /// The insert for one row, tagged with `feed_id`
    pub fn statement(&self, feed_id: &str, row: FeedRow) -> Statement {
        let mut params = Vec::with_capacity(self.markers.len() + 1);
        params.push((FEED_MARKER.to_string(), Value::from(feed_id)));
        params.extend(self.markers.iter().cloned().zip(row.into_values()));

        Statement::new(self.sql.clone(), Params::Named(params))
    }
}
