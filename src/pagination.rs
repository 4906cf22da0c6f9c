use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, Result};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// Page number, starting at 1 (default: 1)
    pub page: Option<u32>,
    /// Items per page (default: 10, max: 100)
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub total_items: i64,
    pub last_page: u32,
    pub current_page: u32,
    pub data: Vec<T>,
}

/// Window over a result set, derived from a 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);

        if page == 0 {
            return Err(AppError::invalid_field("page", "Page must be at least 1"));
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(AppError::invalid_field(
                "limit",
                format!("Limit must be between 1 and {}", MAX_LIMIT),
            ));
        }

        Ok(Self { page, limit })
    }

    pub fn from_query(query: &PageQuery) -> Result<Self> {
        Self::new(query.page, query.limit)
    }

    pub fn skip(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    pub fn last_page(&self, total_items: i64) -> u32 {
        let pages = (total_items.max(0) as u64).div_ceil(self.limit as u64) as u32;
        pages.max(1)
    }

    pub fn paginate<T>(&self, total_items: i64, data: Vec<T>) -> PaginatedResponse<T> {
        PaginatedResponse {
            total_items,
            last_page: self.last_page(total_items),
            current_page: self.page,
            data,
        }
    }
}
