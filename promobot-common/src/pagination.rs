//! Pagination utilities
//!
//! One code path for every list endpoint: count, clamp, then LIMIT/OFFSET.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Upper bound on page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page
    pub limit: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page/limit
///
/// Ensures limit is within [1, MAX_PAGE_SIZE] and page within [1, total_pages].
///
/// # Examples
/// ```
/// use promobot_common::pagination::calculate_pagination;
///
/// // 45 results at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, Some(2), Some(20));
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(45, Some(99), Some(20));
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: Option<i64>,
    requested_limit: Option<i64>,
) -> Pagination {
    let limit = requested_limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let total_results = total_results.max(0);
    let total_pages = (total_results + limit - 1) / limit;
    let page = requested_page.unwrap_or(1).max(1).min(total_pages.max(1));
    let offset = (page - 1) * limit;

    Pagination {
        page,
        limit,
        total_pages,
        offset,
    }
}

/// Paginated list response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl<T> Page<T> {
    pub fn new(docs: Vec<T>, total_docs: i64, pagination: Pagination) -> Self {
        Self {
            docs,
            total_docs,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: pagination.total_pages,
            has_next_page: pagination.page < pagination.total_pages,
            has_prev_page: pagination.page > 1,
        }
    }

    /// Convert document type, keeping page metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            docs: self.docs.into_iter().map(f).collect(),
            total_docs: self.total_docs,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            has_next_page: self.has_next_page,
            has_prev_page: self.has_prev_page,
        }
    }
}

/// Sort order parsed from a `sort` query parameter (`field` or `-field`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    /// Whitelisted SQL column
    pub column: &'static str,
    pub descending: bool,
}

impl SortOrder {
    /// Resolve a sort parameter against a whitelist of (api field, SQL column) pairs
    ///
    /// Unknown fields fall back to `default`.
    pub fn parse(
        raw: Option<&str>,
        allowed: &[(&str, &'static str)],
        default: SortOrder,
    ) -> SortOrder {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return default;
        };
        let (field, descending) = match raw.strip_prefix('-') {
            Some(field) => (field, true),
            None => (raw, false),
        };
        allowed
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| SortOrder { column, descending })
            .unwrap_or(default)
    }

    /// `ORDER BY` clause fragment
    pub fn to_sql(&self) -> String {
        format!(
            " ORDER BY {} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, Some(2), Some(100));
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_defaults() {
        let p = calculate_pagination(45, None, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_limit_clamped() {
        let p = calculate_pagination(1000, Some(1), Some(5000));
        assert_eq!(p.limit, MAX_PAGE_SIZE);

        let p = calculate_pagination(10, Some(1), Some(0));
        assert_eq!(p.limit, 1);
        assert_eq!(p.total_pages, 10);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, Some(0), Some(100));
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, Some(3), None);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_page_flags() {
        let p = calculate_pagination(45, Some(2), Some(20));
        let page = Page::new(vec![1, 2, 3], 45, p);
        assert!(page.has_next_page);
        assert!(page.has_prev_page);

        let last = Page::new(Vec::<i32>::new(), 45, calculate_pagination(45, Some(3), Some(20)));
        assert!(!last.has_next_page);
    }

    #[test]
    fn test_sort_parse() {
        let allowed = [("price", "price"), ("createdAt", "created_at")];
        let default = SortOrder { column: "created_at", descending: true };

        let s = SortOrder::parse(Some("-price"), &allowed, default);
        assert_eq!(s, SortOrder { column: "price", descending: true });

        let s = SortOrder::parse(Some("createdAt"), &allowed, default);
        assert_eq!(s.to_sql(), " ORDER BY created_at ASC");

        // Unknown field never reaches SQL
        let s = SortOrder::parse(Some("price; DROP TABLE products"), &allowed, default);
        assert_eq!(s, default);

        assert_eq!(SortOrder::parse(None, &allowed, default), default);
    }
}
