//! Persistent identifier resolution.

use super::store::StoreResult;
use super::ObjectId;

/// Scheme prefix written in front of persistent identifiers in the manifest.
pub const IDENTIFIER_SCHEME: &str = "urn";

/// Maps stable persistent identifiers (without scheme) to objects and back.
pub trait IdentifierResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Option<ObjectId>;

    fn identifier_of(&self, object: ObjectId) -> Option<String>;

    /// Bind `identifier` to `object`. Fails if it is already bound to another object.
    fn register(&self, identifier: &str, object: ObjectId) -> StoreResult<()>;

    fn unregister(&self, identifier: &str) -> StoreResult<()>;

    /// Mint and bind a fresh identifier for `object`.
    fn mint(&self, object: ObjectId) -> StoreResult<String>;
}

/// `urn:<identifier>` as written in the manifest.
pub fn to_urn(identifier: &str) -> String {
    format!("{}:{}", IDENTIFIER_SCHEME, identifier)
}

/// Strip a leading `scheme:` prefix (`urn:example/42` -> `example/42`).
///
/// Values without a scheme are returned unchanged.
pub fn strip_scheme(value: &str) -> &str {
    match value.split_once(':') {
        Some((scheme, rest))
            if !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            rest
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_prefix() {
        assert_eq!(strip_scheme("urn:example/42"), "example/42");
        assert_eq!(strip_scheme("hdl:123/456"), "123/456");
        assert_eq!(strip_scheme("123/456"), "123/456");
        assert_eq!(strip_scheme("a/b:c"), "a/b:c");
    }

    #[test]
    fn urn_round_trip() {
        assert_eq!(strip_scheme(&to_urn("example/42")), "example/42");
    }
}
