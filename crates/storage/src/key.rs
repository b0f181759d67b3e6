//! Bucket and key validation.
//!
//! Object keys are `/`-separated strings. Every backend validates keys before
//! use so that a key can never address anything outside its bucket, even on
//! backends that map keys onto a filesystem.

use crate::error::{ErrorKind, Result};

/// Validates and normalizes an object key.
///
/// Empty and `.` segments are dropped; `..` segments are rejected outright
/// (keys are identifiers, not paths to be resolved). Null bytes are rejected.
///
/// # Examples
///
/// ```
/// use partbook_storage::validate_key;
/// // Valid keys
/// assert_eq!(validate_key("org/resource/Flute.pdf").unwrap(), "org/resource/Flute.pdf");
/// assert_eq!(validate_key("/org//resource/./Flute.pdf").unwrap(), "org/resource/Flute.pdf");
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("org/../../passwd").is_err());
/// assert!(validate_key("a\0b").is_err());
/// assert!(validate_key("//").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            s if s.contains('\0') => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            s => segments.push(s),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}

/// Validates a bucket name: a single non-empty segment.
pub fn validate_bucket(bucket: &str) -> Result<&str> {
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\', '\0']) {
        exn::bail!(ErrorKind::InvalidKey(bucket.to_string()));
    }
    Ok(bucket)
}

/// Validates a listing prefix. Unlike keys, prefixes may be empty (list
/// everything) and may end part-way through a segment.
pub(crate) fn validate_prefix(prefix: &str) -> Result<&str> {
    if prefix.contains('\0') || prefix.split('/').any(|segment| segment == "..") {
        exn::bail!(ErrorKind::InvalidKey(prefix.to_string()));
    }
    Ok(prefix.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Flute.pdf", "Flute.pdf")]
    #[case("org/res/Flute.pdf", "org/res/Flute.pdf")]
    #[case("org//res", "org/res")]
    #[case("./org/./res/", "org/res")]
    #[case("/leading", "leading")]
    #[case("with space/Horn in F.pdf", "with space/Horn in F.pdf")]
    fn test_valid_keys(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(validate_key(key).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("//")]
    #[case("..")]
    #[case("a/../b")]
    #[case("a\0b")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate_key(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_buckets() {
        assert_eq!(validate_bucket("scores").unwrap(), "scores");
        assert!(validate_bucket("").is_err());
        assert!(validate_bucket("..").is_err());
        assert!(validate_bucket("a/b").is_err());
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(validate_prefix("").unwrap(), "");
        assert_eq!(validate_prefix("/org/res").unwrap(), "org/res");
        assert_eq!(validate_prefix("org/re").unwrap(), "org/re");
        assert!(validate_prefix("../org").is_err());
    }
}
