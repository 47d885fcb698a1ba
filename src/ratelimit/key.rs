//! Counter key scoping.

use crate::error::{QuotagateError, Result};

/// Joins a prefix to a caller key.
pub const KEY_SEPARATOR: char = ':';

/// A caller key placed inside an optional namespace.
///
/// Two limiters with different prefixes never share counters in the same
/// store, even for identical caller keys. Prefixes may not contain
/// [`KEY_SEPARATOR`], otherwise `"a" + "b:c"` and `"a:b" + "c"` would share a
/// counter. Caller keys may contain it freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
    /// The namespace, empty for none
    pub prefix: String,
    /// The caller-supplied key
    pub key: String,
}

impl ScopedKey {
    pub fn new(prefix: &str, key: &str) -> Result<Self> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            key: key.to_string(),
        })
    }

    /// The key under which the counter is stored.
    pub fn to_store_key(&self) -> String {
        scoped_key(&self.prefix, &self.key)
    }
}

impl std::fmt::Display for ScopedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

/// Reject prefixes that would make scoped keys ambiguous.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.contains(KEY_SEPARATOR) {
        return Err(QuotagateError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }
    Ok(())
}

/// `key` when `prefix` is empty, otherwise `"{prefix}:{key}"`.
///
/// Unambiguous only for prefixes accepted by [`validate_prefix`].
pub fn scoped_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prefix_is_transparent() {
        assert_eq!(scoped_key("", "user:42"), "user:42");
    }

    #[test]
    fn test_prefix_namespaces_key() {
        assert_eq!(scoped_key("api", "user:42"), "api:user:42");

        let key = ScopedKey::new("login", "10.0.0.1").unwrap();
        assert_eq!(key.to_string(), "login:10.0.0.1");
        assert_ne!(key, ScopedKey::new("search", "10.0.0.1").unwrap());
    }

    #[test]
    fn test_prefix_with_separator_is_rejected() {
        // "a" + "b:c" and "a:b" + "c" would both be stored as "a:b:c"
        assert!(ScopedKey::new("a", "b:c").is_ok());
        let err = ScopedKey::new("a:b", "c").unwrap_err();
        assert!(matches!(err, QuotagateError::InvalidPrefix { ref prefix } if prefix == "a:b"));
        assert!(err.is_config_error());
        assert!(validate_prefix("").is_ok());
    }
}
