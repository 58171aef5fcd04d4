//! Credential store: the only shared mutable state of the service.
//!
//! Uniqueness of emails is the store's job. Implementations report a
//! violation as [`AppError::DuplicateEmail`] and a missing row on
//! `update`/`delete` as [`AppError::NotFound`].

use async_trait::async_trait;

use crate::error::AppError;

mod memory;
mod postgres;
mod repo_types;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use repo_types::{Role, User, UserPatch, UserRow};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn insert(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, AppError>;
    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, AppError>;
    async fn delete(&self, id: i64) -> Result<(), AppError>;
    /// One page of users, newest first, plus the total row count.
    /// `page` starts at 1.
    async fn list(&self, page: i64, page_size: i64) -> Result<(Vec<User>, i64), AppError>;
    async fn ping(&self) -> bool;
}

/// Rows to skip before `page`; saturates instead of overflowing.
pub(crate) fn page_offset(page: i64, page_size: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(page_size.max(0))
}

#[cfg(test)]
mod tests {
    use super::page_offset;

    #[test]
    fn offset_starts_at_zero_and_saturates() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(i64::MAX, 100), i64::MAX);
    }
}
