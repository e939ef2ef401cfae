//! Skip/limit pagination and navigation links for list endpoints.

use serde::Serialize;

/// Default page size when the caller does not supply one.
pub const DEFAULT_LIMIT: i64 = 10;
/// Largest page a caller may request.
pub const MAX_LIMIT: i64 = 100;
/// Largest offset a caller may request; `skip + limit` always fits in `i64`.
pub const MAX_SKIP: i64 = i64::MAX - MAX_LIMIT;

/// A validated skip/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Build a window from optional query parameters, clamping `skip` to
    /// `0..=MAX_SKIP` and `limit` to `1..=MAX_LIMIT`.
    pub fn new(skip: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            skip: skip.unwrap_or(0).clamp(0, MAX_SKIP),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One navigation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    #[serde(skip)]
    pub skip: i64,
}

impl Link {
    fn new(base_url: &str, skip: i64, limit: i64) -> Self {
        Self {
            href: format!("{base_url}?skip={skip}&limit={limit}"),
            skip,
        }
    }
}

/// First/last/next/previous links for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first: Link,
    pub last: Link,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Link>,
}

/// A page of items with its navigation links.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub links: PageLinks,
}

/// Compute navigation links for the window `skip`/`limit` over `total` rows.
///
/// - `first` is always `skip=0`.
/// - `last` is `skip = floor(total / limit) * limit` (`0` for a zero limit).
/// - `next` is present only when `skip + limit < total` (and the sum fits).
/// - `previous` is present only when `skip > 0`, at `max(skip - limit, 0)`.
pub fn build_links(base_url: &str, skip: i64, limit: i64, total: i64) -> PageLinks {
    let last_skip = if limit > 0 { (total / limit) * limit } else { 0 };
    let next_skip = skip.checked_add(limit).filter(|&next| next < total);

    PageLinks {
        first: Link::new(base_url, 0, limit),
        last: Link::new(base_url, last_skip, limit),
        next: next_skip.map(|next| Link::new(base_url, next, limit)),
        previous: (skip > 0).then(|| Link::new(base_url, skip.saturating_sub(limit).max(0), limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:5002/mealplans";

    #[test]
    fn middle_page_has_all_links() {
        let links = build_links(BASE, 10, 10, 25);
        assert_eq!(links.first.skip, 0);
        assert_eq!(links.last.skip, 20);
        assert_eq!(links.next.as_ref().map(|l| l.skip), Some(20));
        assert_eq!(links.previous.as_ref().map(|l| l.skip), Some(0));
        assert_eq!(links.first.href, format!("{BASE}?skip=0&limit=10"));
        assert_eq!(links.last.href, format!("{BASE}?skip=20&limit=10"));
    }

    #[test]
    fn first_page_has_no_previous() {
        let links = build_links(BASE, 0, 10, 25);
        assert!(links.previous.is_none());
        assert_eq!(links.next.map(|l| l.skip), Some(10));
    }

    #[test]
    fn last_page_has_no_next() {
        let links = build_links(BASE, 20, 10, 25);
        assert!(links.next.is_none());
        assert_eq!(links.previous.map(|l| l.skip), Some(10));
    }

    #[test]
    fn previous_never_goes_negative() {
        let links = build_links(BASE, 3, 10, 25);
        assert_eq!(links.previous.map(|l| l.skip), Some(0));
    }

    #[test]
    fn exact_multiple_points_last_past_the_end() {
        // floor(20 / 10) * 10 = 20, one past the final full page.
        let links = build_links(BASE, 0, 10, 20);
        assert_eq!(links.last.skip, 20);
    }

    #[test]
    fn empty_collection() {
        let links = build_links(BASE, 0, 10, 0);
        assert_eq!(links.last.skip, 0);
        assert!(links.next.is_none());
        assert!(links.previous.is_none());
    }

    #[test]
    fn zero_limit_does_not_divide() {
        let links = build_links(BASE, 0, 0, 5);
        assert_eq!(links.last.skip, 0);
    }

    #[test]
    fn absent_links_are_not_serialized() {
        let json = serde_json::to_value(build_links(BASE, 0, 10, 5)).unwrap();
        assert_eq!(json["first"]["href"], format!("{BASE}?skip=0&limit=10"));
        assert!(json.get("next").is_none());
        assert!(json.get("previous").is_none());
        assert!(json["first"].get("skip").is_none());
    }

    #[test]
    fn huge_skip_is_capped_and_has_no_next() {
        let request = PageRequest::new(Some(i64::MAX), Some(10));
        assert_eq!(request.skip, MAX_SKIP);

        let links = build_links(BASE, request.skip, request.limit, 25);
        assert!(links.next.is_none());
        assert_eq!(links.previous.map(|l| l.skip), Some(MAX_SKIP - 10));
    }

    #[test]
    fn overflowing_window_has_no_next() {
        let links = build_links(BASE, i64::MAX, 10, i64::MAX);
        assert!(links.next.is_none());
        assert_eq!(links.previous.map(|l| l.skip), Some(i64::MAX - 10));
    }

    #[test]
    fn page_request_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { skip: 0, limit: 10 });
        assert_eq!(
            PageRequest::new(Some(-5), Some(0)),
            PageRequest { skip: 0, limit: 1 }
        );
        assert_eq!(
            PageRequest::new(Some(30), Some(500)),
            PageRequest { skip: 30, limit: 100 }
        );
    }
}
