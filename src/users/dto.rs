use serde::{Deserialize, Serialize};

use crate::store::User;

pub const MAX_PAGE_SIZE: i64 = 100;
/// Highest page whose row offset still fits in an `i64`.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl Pagination {
    /// Clamp to `1 <= page <= MAX_PAGE` and `1 <= limit <= MAX_PAGE_SIZE`.
    pub fn normalized(&self) -> (i64, i64) {
        (
            self.page.clamp(1, MAX_PAGE),
            self.limit.clamp(1, MAX_PAGE_SIZE),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl PageInfo {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = (total + limit - 1) / limit;
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserChangedResponse {
    pub message: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}
