//! Search-filter helpers.
//!
//! Filters embed caller-supplied values (logins, group DNs), so every value
//! goes through the client library's filter escaping before it is
//! concatenated into an expression.

use ldap3::ldap_escape;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

static LEADING_CN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^cn=([^,]+)").expect("leading-cn pattern is valid"));

/// Extracts the common name from a DN whose leading component is `cn=`.
///
/// Returns `None` when the DN starts with any other attribute.
#[must_use]
pub fn group_name_from_dn(dn: &str) -> Option<String> {
    LEADING_CN_RE
        .captures(dn.trim())
        .map(|caps| caps[1].trim().to_string())
}

/// Builds an `(attr=value)(attr=value)...` fragment for every attribute,
/// escaping `value` for safe inclusion.
///
/// The caller wraps the fragment in `(|...)` or `(&...)` as needed.
#[must_use]
pub fn attributes_for_filter<S: AsRef<str>>(attributes: &[S], value: &str) -> String {
    let escaped = ldap_escape(value);
    let mut fragment = String::new();
    for attribute in attributes {
        let _ = write!(fragment, "({}={escaped})", attribute.as_ref());
    }
    fragment
}
