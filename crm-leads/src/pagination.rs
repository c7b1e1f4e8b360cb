//! Page arithmetic for the lead list

use serde::Serialize;

/// Leads returned per page
pub const PAGE_SIZE: i64 = 100;

/// Where a requested page lands once the result count is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Page actually served, starting at 1
    pub page: i64,
    /// 0 when there are no results
    pub total_pages: i64,
    /// Rows to skip before this page
    pub offset: i64,
}

/// Work out the page to serve for `requested_page`
///
/// Pages below 1 serve the first page and pages past the end serve the
/// last one, so a client that overshoots still gets rows back.
///
/// ```
/// use crm_leads::pagination::calculate_pagination;
///
/// let p = calculate_pagination(250, 2);
/// assert_eq!((p.page, p.total_pages, p.offset), (2, 3, 100));
///
/// let p = calculate_pagination(250, 99);
/// assert_eq!((p.page, p.offset), (3, 200));
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64) -> Pagination {
    let total_pages = (total_results.max(0) + PAGE_SIZE - 1) / PAGE_SIZE;
    let last_page = total_pages.max(1);
    let page = requested_page.clamp(1, last_page);

    Pagination {
        page,
        total_pages,
        offset: (page - 1) * PAGE_SIZE,
    }
}
