//! Paging envelope

use serde::{Deserialize, Serialize};

/// A page of results plus totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, size: i64) -> Self {
        let pages = if size > 0 { (total + size - 1) / size } else { 0 };
        Self {
            items,
            total,
            page,
            size,
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        let page: Page<i32> = Page::new(vec![], 41, 1, 20);
        assert_eq!(page.pages, 3);
        let page: Page<i32> = Page::new(vec![], 40, 1, 20);
        assert_eq!(page.pages, 2);
        let page: Page<i32> = Page::new(vec![], 0, 1, 20);
        assert_eq!(page.pages, 0);
    }
}
