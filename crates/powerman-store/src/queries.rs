//! Query builder for history snapshots.

use time::OffsetDateTime;

/// Fluent query builder for history records.
///
/// By default, queries return results ordered by `id` ascending (oldest
/// first), which for history is also timestamp order. Time bounds are
/// inclusive.
///
/// # Example
///
/// ```
/// use powerman_store::HistoryQuery;
/// use time::{Duration, OffsetDateTime};
///
/// let now = OffsetDateTime::now_utc();
/// let last_hour = HistoryQuery::new()
///     .since(now - Duration::hours(1))
///     .until(now);
/// ```
#[derive(Debug, Default, Clone)]
pub struct HistoryQuery {
    /// Include only records at or after this time (optional).
    pub since: Option<OffsetDateTime>,
    /// Include only records at or before this time (optional).
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results to return (optional).
    pub limit: Option<u32>,
    /// If true, order by id descending. Default: false.
    pub newest_first: bool,
}

impl HistoryQuery {
    /// Create a new query with no bounds, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter to records at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to records at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<i64>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        // Rows are stamped in whole seconds; a fractional lower bound rounds up.
        if let Some(since) = self.since {
            conditions.push("recorded_at >= ?");
            let seconds = since.unix_timestamp();
            params.push(if since.nanosecond() > 0 { seconds + 1 } else { seconds });
        }

        if let Some(until) = self.until {
            conditions.push("recorded_at <= ?");
            params.push(until.unix_timestamp());
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (clause, params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, l1, l2, l3, recorded_at FROM history {} ORDER BY id {}",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_new_defaults() {
        let query = HistoryQuery::new();
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.limit.is_none());
        assert!(!query.newest_first);
    }

    #[test]
    fn test_build_sql_without_filters() {
        let sql = HistoryQuery::new().build_sql();
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY id ASC"));
    }

    #[test]
    fn test_build_sql_with_range() {
        let since = datetime!(2024-05-01 00:00:00 UTC);
        let until = datetime!(2024-05-02 00:00:00 UTC);
        let query = HistoryQuery::new().since(since).until(until).limit(5);

        let (clause, params) = query.build_where();
        assert_eq!(clause, "WHERE recorded_at >= ? AND recorded_at <= ?");
        assert_eq!(params, vec![since.unix_timestamp(), until.unix_timestamp()]);
        assert!(query.build_sql().ends_with("LIMIT 5"));
    }

    #[test]
    fn test_fractional_bounds() {
        let since = datetime!(2024-05-01 12:00:00.5 UTC);
        let until = datetime!(2024-05-01 12:00:10.5 UTC);
        let (_, params) = HistoryQuery::new().since(since).until(until).build_where();

        let whole = datetime!(2024-05-01 12:00:00 UTC).unix_timestamp();
        assert_eq!(params, vec![whole + 1, whole + 10]);
    }

    #[test]
    fn test_newest_first() {
        let sql = HistoryQuery::new().newest_first().build_sql();
        assert!(sql.contains("ORDER BY id DESC"));
    }
}
