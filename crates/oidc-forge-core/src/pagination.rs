// ABOUTME: Skip/take pagination used by the store listing operations
// ABOUTME: Keeps page bounds explicit so stores never return unbounded result sets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use serde::{Deserialize, Serialize};

/// Largest page a store will return
pub const MAX_PAGE_SIZE: usize = 500;

/// Skip/take window over a store listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Number of entities to skip
    pub skip: usize,
    /// Maximum number of entities to return
    pub take: usize,
}

impl Page {
    /// Create a page, clamping `take` to [`MAX_PAGE_SIZE`]
    #[must_use]
    pub fn new(skip: usize, take: usize) -> Self {
        Self {
            skip,
            take: take.min(MAX_PAGE_SIZE),
        }
    }

    /// First page of the given size
    #[must_use]
    pub fn first(take: usize) -> Self {
        Self::new(0, take)
    }

    /// Page following this one
    #[must_use]
    pub fn next(&self) -> Self {
        Self::new(self.skip + self.take, self.take)
    }

    /// Apply the window to an iterator
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.take).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        let page = Page::new(2, 3);
        assert_eq!(page.apply(0..10), vec![2, 3, 4]);
        assert_eq!(page.next().apply(0..10), vec![5, 6, 7]);
    }

    #[test]
    fn test_take_is_clamped() {
        assert_eq!(Page::first(10_000).take, MAX_PAGE_SIZE);
    }
}
