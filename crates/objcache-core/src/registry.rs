//! In-process registry of open cache namespaces.
//!
//! A namespace must have a single owning engine: two engines over the same
//! snapshot would overwrite each other's flushes. The registry turns a second
//! open into a [`ObjCacheError::NamespaceInUse`] error instead of silent
//! corruption. Ownership across processes is not checked.

use crate::{ObjCacheError, Result};
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

type Claimed = Arc<Mutex<HashSet<String>>>;

/// Set of namespaces currently owned by an engine.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    claimed: Claimed,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`crate::CacheEngine`].
    pub fn global() -> &'static NamespaceRegistry {
        static GLOBAL: OnceLock<NamespaceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(NamespaceRegistry::new)
    }

    /// Claim `namespace`; the claim lasts as long as the returned lease.
    pub fn claim(&self, namespace: &str) -> Result<NamespaceLease> {
        validate_namespace(namespace)?;

        let mut claimed = self.claimed.lock().unwrap_or_else(|p| p.into_inner());
        if !claimed.insert(namespace.to_string()) {
            return Err(ObjCacheError::NamespaceInUse {
                namespace: namespace.to_string(),
            });
        }
        debug!("Claimed cache namespace {}", namespace);

        Ok(NamespaceLease {
            namespace: namespace.to_string(),
            claimed: Arc::clone(&self.claimed),
        })
    }

    pub fn is_claimed(&self, namespace: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(namespace)
    }
}

/// Ownership of one namespace; released on drop.
#[derive(Debug)]
pub struct NamespaceLease {
    namespace: String,
    claimed: Claimed,
}

impl NamespaceLease {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for NamespaceLease {
    fn drop(&mut self) {
        self.claimed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.namespace);
        debug!("Released cache namespace {}", self.namespace);
    }
}

/// A namespace names a file and a directory, so it must be one plain path
/// component.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let invalid = |reason: &str| ObjCacheError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    };

    if namespace.is_empty() {
        return Err(invalid("namespace is empty"));
    }
    if namespace.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return Err(invalid("namespace contains a separator"));
    }
    let mut components = Path::new(namespace).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("namespace is not a plain name")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let registry = NamespaceRegistry::new();

        let lease = registry.claim("thumbs").unwrap();
        assert_eq!(lease.namespace(), "thumbs");
        assert!(registry.is_claimed("thumbs"));
        assert!(matches!(
            registry.claim("thumbs"),
            Err(ObjCacheError::NamespaceInUse { .. })
        ));

        drop(lease);
        assert!(!registry.is_claimed("thumbs"));
        assert!(registry.claim("thumbs").is_ok());
    }

    #[test]
    fn test_registries_are_independent() {
        let a = NamespaceRegistry::new();
        let b = NamespaceRegistry::new();
        let _lease = a.claim("shared").unwrap();
        assert!(b.claim("shared").is_ok());
    }

    #[test]
    fn test_invalid_namespaces() {
        for ns in ["", ".", "..", "a/b", "a\\b"] {
            assert!(
                matches!(
                    validate_namespace(ns),
                    Err(ObjCacheError::InvalidNamespace { .. })
                ),
                "expected {ns:?} to be rejected"
            );
        }
        assert!(validate_namespace("images-v2").is_ok());
    }
}
