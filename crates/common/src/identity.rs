//! Request-scoped principal.

use serde::{Deserialize, Serialize};

/// The authenticated principal attached to every request.
///
/// Built by the API layer from verified bearer-token claims. The raw token is
/// carried along so downstream clients can forward it to the group service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityContext {
    /// Stable user id (token `sub`).
    pub subject: String,
    /// Display name.
    pub name: String,
    /// Organization (tenant) id.
    pub org_id: String,
    /// Application id within the organization.
    pub app_id: String,
    /// Comma-separated permission list from the token.
    #[serde(default)]
    pub permissions: String,
    /// The raw bearer token, forwarded to the group membership provider.
    #[serde(skip)]
    pub token: String,
}

impl IdentityContext {
    /// Returns whether the principal carries the given permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.split(',').any(|p| p.trim() == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(permissions: &str) -> IdentityContext {
        IdentityContext {
            subject: "u1".into(),
            name: "User One".into(),
            org_id: "o1".into(),
            app_id: "a1".into(),
            permissions: permissions.into(),
            token: String::new(),
        }
    }

    #[test]
    fn test_has_permission() {
        let ic = identity("polls_read, polls_admin");
        assert!(ic.has_permission("polls_admin"));
        assert!(ic.has_permission("polls_read"));
        assert!(!ic.has_permission("polls_write"));
    }

    #[test]
    fn test_empty_permissions() {
        let ic = identity("");
        assert!(!ic.has_permission("polls_admin"));
    }
}
