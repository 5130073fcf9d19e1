//! Session cache key layout.

use uuid::Uuid;

/// Builds namespaced cache keys.
///
/// | Key                              | Value                  |
/// |----------------------------------|------------------------|
/// | `{prefix}:refresh:{hash}`        | `CachedRefreshToken`   |
/// | `{prefix}:principal:{user_id}`   | `Principal`            |
/// | `{prefix}:health:{instance}`     | health monitor nonce   |
#[derive(Debug, Clone)]
pub struct SessionKeys {
    prefix: String,
}

impl SessionKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn refresh(&self, token_hash: &str) -> String {
        format!("{}:refresh:{}", self.prefix, token_hash)
    }

    pub fn principal(&self, user_id: Uuid) -> String {
        format!("{}:principal:{}", self.prefix, user_id)
    }

    pub fn health(&self, instance: &str) -> String {
        format!("{}:health:{}", self.prefix, instance)
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self::new("warden")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = SessionKeys::new("app");
        let id = Uuid::nil();

        assert_eq!(keys.refresh("abc"), "app:refresh:abc");
        assert_eq!(
            keys.principal(id),
            "app:principal:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys.health("node-1"), "app:health:node-1");
    }
}
