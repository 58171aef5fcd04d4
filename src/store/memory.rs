use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{page_offset, Role, User, UserPatch, UserStore};
use crate::error::AppError;

/// In-process store used by tests and by the server when no database is
/// configured. Enforces the same case-insensitive email uniqueness as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a user's role directly, bypassing the HTTP surface.
    pub async fn set_role(&self, id: i64, role: Role) -> Result<User, AppError> {
        self.update(
            id,
            UserPatch {
                role: Some(role),
                ..Default::default()
            },
        )
        .await
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn insert(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(email, None) {
            return Err(AppError::DuplicateEmail);
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            display_name: display_name.to_string(),
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&id) {
            return Err(AppError::NotFound);
        }
        if let Some(email) = patch.email.as_deref() {
            if inner.email_taken(email, Some(id)) {
                return Err(AppError::DuplicateEmail);
            }
        }
        let user = inner.users.get_mut(&id).ok_or(AppError::NotFound)?;
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        if let Some(name) = patch.display_name {
            user.display_name = name;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        user.updated_at = Some(OffsetDateTime::now_utc());
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.inner
            .write()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn list(&self, page: i64, page_size: i64) -> Result<(Vec<User>, i64), AppError> {
        let inner = self.inner.read().await;
        let total = inner.users.len() as i64;
        let skip = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
        // ids are handed out in insertion order, so reverse id order is newest first
        let users = inner
            .users
            .values()
            .rev()
            .skip(skip)
            .take(page_size.max(0) as usize)
            .cloned()
            .collect();
        Ok((users, total))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_rejects_duplicate_email_ignoring_case() {
        let store = MemoryUserStore::new();
        store.insert("ana@example.com", "h", "Ana").await.unwrap();
        let err = store
            .insert("ANA@example.com", "h", "Ana again")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    #[tokio::test]
    async fn ids_start_at_one_and_new_users_are_plain_users() {
        let store = MemoryUserStore::new();
        let user = store.insert("a@example.com", "h", "A").await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.role, Role::User);
        assert!(user.updated_at.is_none());
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let store = MemoryUserStore::new();
        let user = store.insert("a@example.com", "h", "A").await.unwrap();
        let updated = store
            .update(
                user.id,
                UserPatch {
                    display_name: Some("Alice".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Alice");
        assert_eq!(updated.email, "a@example.com");
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_to_taken_email_is_duplicate() {
        let store = MemoryUserStore::new();
        store.insert("a@example.com", "h", "A").await.unwrap();
        let b = store.insert("b@example.com", "h", "B").await.unwrap();
        let err = store
            .update(
                b.id,
                UserPatch {
                    email: Some("a@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.delete(42).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            store.set_role(42, Role::Admin).await.unwrap_err(),
            AppError::NotFound
        ));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let store = MemoryUserStore::new();
        for i in 1..=5 {
            store
                .insert(&format!("u{i}@example.com"), "h", "U")
                .await
                .unwrap();
        }
        let (first, total) = store.list(1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.iter().map(|u| u.id).collect::<Vec<_>>(), vec![5, 4]);

        let (last, _) = store.list(3, 2).await.unwrap();
        assert_eq!(last.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn list_past_the_end_is_empty() {
        let store = MemoryUserStore::new();
        store.insert("a@example.com", "h", "A").await.unwrap();
        let (users, total) = store.list(i64::MAX, 100).await.unwrap();
        assert!(users.is_empty());
        assert_eq!(total, 1);
    }
}
