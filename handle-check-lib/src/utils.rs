//! Utility functions for username handling and body inspection.

use crate::error::HandleCheckError;

/// Validate a username before a batch starts.
///
/// Only rejects input that cannot be probed at all. Whether a username is
/// acceptable to a particular site is decided by that site's `regexCheck`.
pub fn validate_username(username: &str) -> Result<(), HandleCheckError> {
    if username.trim().is_empty() {
        return Err(HandleCheckError::invalid_username(
            username,
            "Username cannot be empty",
        ));
    }

    if username.contains(['\r', '\n']) {
        return Err(HandleCheckError::invalid_username(
            username,
            "Username cannot contain line breaks",
        ));
    }

    Ok(())
}

/// Whether `username` satisfies a site's `regexCheck` rule.
///
/// Rules are searched, not anchored, and are tried with `regex` first.
/// Catalogs carry rules with look-around or backreferences, which only
/// `fancy_regex` accepts.
pub fn satisfies_rule(pattern: &str, username: &str) -> Result<bool, HandleCheckError> {
    match regex::Regex::new(pattern) {
        Ok(rule) => Ok(rule.is_match(username)),
        Err(_) => {
            let rule = fancy_regex::Regex::new(pattern)?;
            Ok(rule.is_match(username)?)
        }
    }
}

/// Keywords (case-insensitive) that appear in a response body.
pub fn match_keywords(body: &str, keywords: &[String]) -> Vec<String> {
    if keywords.is_empty() || body.is_empty() {
        return Vec::new();
    }

    let body = body.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| body.contains(&keyword.to_lowercase()))
        .cloned()
        .collect()
}
