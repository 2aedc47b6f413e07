//! Query-string builder for REST table requests.
//!
//! Produces the PostgREST-style parameters the backend understands:
//! `select=...`, `col=eq.value`, `col=ilike.*term*`, `col=in.(a,b)`,
//! `order=col.desc`, `limit=n`.

use std::fmt::Display;

/// Sort direction for [`Query::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Filters, projection, ordering, and limit for one table request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns and embedded relations to return (e.g., `*,part_images(*)`).
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    /// `column = value`.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// Case-insensitive substring match.
    ///
    /// `*` and `,` in the term are stripped since they are operators in the
    /// filter syntax.
    #[must_use]
    pub fn contains_ci(mut self, column: &str, term: &str) -> Self {
        let term: String = term
            .chars()
            .filter(|c| !matches!(c, '*' | ',' | '(' | ')'))
            .collect();
        self.filters
            .push((column.to_string(), format!("ilike.*{}*", term.trim())));
        self
    }

    /// `column IN (values)`.
    #[must_use]
    pub fn is_in<I>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let list = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.filters
            .push((column.to_string(), format!("in.({list})")));
        self
    }

    /// Add a sort key. Keys apply in the order they were added.
    #[must_use]
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order
            .push(format!("{column}.{}", direction.as_str()));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether any row filter is set. Writes without filters are refused.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Render as query-string pairs.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 3);
        if let Some(select) = &self.select {
            pairs.push(("select".to_string(), select.clone()));
        }
        pairs.extend(self.filters.iter().cloned());
        if !self.order.is_empty() {
            pairs.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_full_query() {
        let query = Query::new()
            .select("*,categories(*),part_images(*)")
            .eq("is_active", true)
            .contains_ci("name", " panda ")
            .order("created_at", Direction::Desc)
            .order("name", Direction::Asc)
            .limit(20);

        assert_eq!(
            query.to_pairs(),
            vec![
                pair("select", "*,categories(*),part_images(*)"),
                pair("is_active", "eq.true"),
                pair("name", "ilike.*panda*"),
                pair("order", "created_at.desc,name.asc"),
                pair("limit", "20"),
            ]
        );
    }

    #[test]
    fn test_contains_ci_strips_operators() {
        let pairs = Query::new().contains_ci("name", "a*b,(c)").to_pairs();
        assert_eq!(pairs, vec![pair("name", "ilike.*abc*")]);
    }

    #[test]
    fn test_is_in() {
        let pairs = Query::new().is_in("user_id", ["u1", "u2"]).to_pairs();
        assert_eq!(pairs, vec![pair("user_id", "in.(u1,u2)")]);
    }

    #[test]
    fn test_has_filters() {
        assert!(!Query::new().select("*").limit(1).has_filters());
        assert!(Query::new().eq("id", 1).has_filters());
    }
}
