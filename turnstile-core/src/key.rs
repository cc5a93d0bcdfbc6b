//! Cache key derivation.
//!
//! A [`CacheKey`] identifies "the same logical operation": two requests with
//! the same method, path, and client-supplied idempotency token map to the
//! same key, and any difference in any component maps to a different key.

use std::fmt;

use crate::error::InvalidKeyInput;

/// Separator between the key components.
const DELIMITER: char = ':';

/// Escape character for delimiter occurrences inside a component.
const ESCAPE: char = '\\';

/// Derived identity for a logical operation attempt.
///
/// Opaque string composed from `(method, path, token)`. The components are
/// joined with [`DELIMITER`], and any delimiter or escape character inside a
/// component is escaped first, so `("GET", "/a:b", "t")` and
/// `("GET", "/a", "b:t")` can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the cache key for a request.
    ///
    /// Rejects empty or whitespace-only tokens; this is the one validation
    /// performed before a request reaches the coordinator.
    pub fn derive(method: &str, path: &str, token: &str) -> Result<Self, InvalidKeyInput> {
        if token.trim().is_empty() {
            return Err(InvalidKeyInput);
        }

        let mut out = String::with_capacity(method.len() + path.len() + token.len() + 2);
        escape_into(&mut out, method);
        out.push(DELIMITER);
        escape_into(&mut out, path);
        out.push(DELIMITER);
        escape_into(&mut out, token);
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_into(out: &mut String, component: &str) {
    for ch in component.chars() {
        if ch == DELIMITER || ch == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_empty_token() {
        assert_eq!(
            CacheKey::derive("POST", "/usuarios", ""),
            Err(InvalidKeyInput)
        );
    }

    #[test]
    fn rejects_whitespace_token() {
        assert_eq!(
            CacheKey::derive("POST", "/usuarios", "  \t "),
            Err(InvalidKeyInput)
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = CacheKey::derive("POST", "/usuarios", "abc-123").unwrap();
        let b = CacheKey::derive("POST", "/usuarios", "abc-123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn components_change_the_key() {
        let base = CacheKey::derive("POST", "/usuarios", "abc-123").unwrap();
        assert_ne!(base, CacheKey::derive("PUT", "/usuarios", "abc-123").unwrap());
        assert_ne!(base, CacheKey::derive("POST", "/tarefas", "abc-123").unwrap());
        assert_ne!(base, CacheKey::derive("POST", "/usuarios", "abc-124").unwrap());
    }

    #[test]
    fn delimiter_injection_does_not_collide() {
        // Naive concatenation would make both of these "GET:/a:b".
        let a = CacheKey::derive("GET", "/a:b", "t").unwrap();
        let b = CacheKey::derive("GET", "/a", "b:t").unwrap();
        assert_ne!(a, b);

        let c = CacheKey::derive("GET", "/a\\", ":t").unwrap();
        let d = CacheKey::derive("GET", "/a\\:", "t").unwrap();
        assert_ne!(c, d);
    }

    proptest! {
        #[test]
        fn distinct_triples_produce_distinct_keys(
            m1 in "(GET|POST|PUT|DELETE)",
            m2 in "(GET|POST|PUT|DELETE)",
            p1 in "[a-z:/\\\\]{0,12}",
            p2 in "[a-z:/\\\\]{0,12}",
            t1 in "[a-z0-9:\\\\-]{1,12}",
            t2 in "[a-z0-9:\\\\-]{1,12}",
        ) {
            let k1 = CacheKey::derive(&m1, &p1, &t1).unwrap();
            let k2 = CacheKey::derive(&m2, &p2, &t2).unwrap();
            let same_input = m1 == m2 && p1 == p2 && t1 == t2;
            prop_assert_eq!(same_input, k1 == k2);
        }
    }
}
