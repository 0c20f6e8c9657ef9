//! Registered accounts and the identity of the current request.

use crate::model::User;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Lookup of registered accounts. Registration itself lives elsewhere.
pub trait UserDirectory: Send + Sync {
    /// Case-insensitive email lookup.
    fn find_by_email(&self, email: &str) -> Option<User>;

    fn find_by_id(&self, id: &str) -> Option<User>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Emails are unique regardless of case.
    pub fn register(&self, id: &str, email: &str, full_name: &str) -> Result<User> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email.trim()))
        {
            return Err(Error::validation(format!(
                "Email `{}` is already registered",
                email
            )));
        }
        let user = User {
            id: id.to_owned(),
            email: email.trim().to_owned(),
            full_name: full_name.to_owned(),
        };
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim();
        self.users
            .read()
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    fn find_by_id(&self, id: &str) -> Option<User> {
        self.users.read().get(id).cloned()
    }
}

/// Authenticated caller of an owner/signer operation, threaded explicitly through
/// every call instead of living in ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
}

impl Caller {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            full_name: full_name.into(),
        }
    }

    /// `401` for unauthenticated requests.
    pub fn require(caller: Option<&Caller>) -> Result<&Caller> {
        caller.ok_or(Error::Unauthorized)
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Caller::new(user.id.clone(), user.email.clone(), user.full_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let users = InMemoryUserDirectory::new();
        users.register("u1", "Alice@Example.com", "Alice").unwrap();
        assert_eq!(
            users.find_by_email("alice@example.COM").map(|u| u.id),
            Some("u1".to_owned())
        );
        assert!(users.register("u2", "ALICE@example.com", "Eve").is_err());
        assert!(users.find_by_email("bob@example.com").is_none());
    }

    #[test]
    fn test_missing_caller_is_unauthorized() {
        assert!(matches!(Caller::require(None), Err(Error::Unauthorized)));
    }
}
