//! Search operations against the bound directory connection.
//!
//! The attribute normalization here is deliberately table-driven: raw
//! attribute names are lower-cased, renamed through [`ATTRIBUTE_MAP`], and
//! collapsed to a single trimmed value unless the server reported more than
//! one value, in which case the full ordered list is kept.

use crate::connection::{LdapConnection, LdapEntry, SearchScope};
use crate::filter;
use crate::Result;
use keyward_core::{DirectoryError, EventMessage, EventSink, ResultCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Mapping from raw (lower-cased) directory attribute names to the
/// normalized names the rest of the system consumes. Earlier entries win
/// when several raw attributes rename to the same normalized name.
const ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("dn", "dn"),
    ("displayname", "fullname"),
    ("fullname", "fullname"),
    ("givenname", "name"),
    ("sn", "sn"),
    ("samaccountname", "login"),
    ("uid", "login"),
    ("userprincipalname", "login"),
    ("memberof", "group"),
    ("groupmembership", "group"),
    ("mail", "mail"),
    ("lockouttime", "expire"),
];

/// A normalized attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// A single trimmed value.
    Single(String),
    /// An ordered multi-valued result, kept verbatim.
    Many(Vec<String>),
}

/// Normalized attributes of a single directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCollection {
    values: HashMap<String, AttributeValue>,
}

impl AttributeCollection {
    /// Builds a collection from a raw entry.
    ///
    /// Raw attribute names are lower-cased before the [`ATTRIBUTE_MAP`]
    /// lookup; attributes absent from the table are dropped, so synthetic
    /// keys from raw result shapes (such as `count`) never survive. A
    /// reported value count above one keeps the ordered list; exactly one
    /// value collapses to a trimmed scalar.
    #[must_use]
    pub(crate) fn from_entry(entry: &LdapEntry) -> Self {
        let lowered: HashMap<String, &Vec<String>> = entry
            .attributes
            .iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values))
            .collect();

        let mut values = HashMap::new();
        for (raw, normalized) in ATTRIBUTE_MAP {
            if values.contains_key(*normalized) {
                continue;
            }
            if *raw == "dn" {
                if !entry.dn.trim().is_empty() {
                    values.insert(
                        (*normalized).to_string(),
                        AttributeValue::Single(entry.dn.trim().to_string()),
                    );
                }
                continue;
            }
            let Some(raw_values) = lowered.get(*raw) else {
                continue;
            };
            if raw_values.len() > 1 {
                values.insert(
                    (*normalized).to_string(),
                    AttributeValue::Many((*raw_values).clone()),
                );
            } else if let Some(value) = raw_values.first() {
                values.insert(
                    (*normalized).to_string(),
                    AttributeValue::Single(value.trim().to_string()),
                );
            }
        }

        Self { values }
    }

    /// Returns the normalized value under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Returns the scalar value under `name`, taking the first element of a
    /// multi-valued result.
    #[must_use]
    pub fn single(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            AttributeValue::Single(value) => Some(value),
            AttributeValue::Many(values) => values.first().map(String::as_str),
        }
    }

    /// Returns the value under `name` as a list, wrapping a scalar.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(AttributeValue::Single(value)) => vec![value.clone()],
            Some(AttributeValue::Many(values)) => values.clone(),
            None => Vec::new(),
        }
    }

    /// True when the entry held none of the mapped attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of normalized attributes present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Result set of a generic search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    count: usize,
    entries: Vec<LdapEntry>,
}

impl SearchResult {
    pub(crate) fn new(entries: Vec<LdapEntry>) -> Self {
        Self {
            count: entries.len(),
            entries,
        }
    }

    /// Total number of matched entries.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// The matched entries.
    #[must_use]
    pub fn entries(&self) -> &[LdapEntry] {
        &self.entries
    }

    /// Consumes the result, yielding the matched entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<LdapEntry> {
        self.entries
    }
}

/// Search operations bound to one connection.
pub struct LdapActions {
    connection: LdapConnection,
    events: Arc<dyn EventSink>,
}

impl LdapActions {
    /// Creates the actions layer over a connection.
    #[must_use]
    pub fn new(connection: LdapConnection, events: Arc<dyn EventSink>) -> Self {
        Self { connection, events }
    }

    /// The connection this layer searches through.
    #[must_use]
    pub fn connection(&self) -> &LdapConnection {
        &self.connection
    }

    /// Resolves the configured group to the DNs of matching group entries.
    ///
    /// The configured group may be a bare name, a DN fragment (its leading
    /// `cn=` value is used), or a wildcard. The search filter is
    /// `(&(cn=<escaped-group>)<extra_filter>)` against the configured
    /// search base.
    ///
    /// # Errors
    ///
    /// Zero matches produce a NO_SUCH_OBJECT-coded [`DirectoryError`]
    /// after an `ldap.search.group` diagnostic event; search failures
    /// propagate as-is.
    pub async fn search_groups_dn(&self, extra_filter: Option<&str>) -> Result<Vec<String>> {
        let params = self.connection.params();
        let group = params.group();
        let group_name = if group.contains('=') {
            filter::group_name_from_dn(group).unwrap_or_else(|| group.to_string())
        } else {
            group.to_string()
        };

        let group_filter = format!(
            "(&{}{})",
            filter::attributes_for_filter(&["cn"], &group_name),
            extra_filter.unwrap_or_default()
        );
        let entries = self
            .connection
            .search(
                params.search_base(),
                SearchScope::Subtree,
                &group_filter,
                &["cn".to_string()],
            )
            .await?;

        if entries.is_empty() {
            self.events.emit(
                EventMessage::new("ldap.search.group", "Group not found in the directory")
                    .detail("Group", &group_name)
                    .detail("LDAP ERROR", "no entries matched")
                    .detail("LDAP FILTER", &group_filter),
            );
            return Err(DirectoryError::new(
                format!("group `{group_name}` not found"),
                "no entries matched",
                ResultCode::NoSuchObject,
            )
            .into());
        }

        Ok(entries.into_iter().map(|entry| entry.dn).collect())
    }

    /// Fetches one entry matching `filter` and normalizes its attributes.
    ///
    /// Returns an empty collection when nothing matches.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn get_attributes(&self, filter: &str) -> Result<AttributeCollection> {
        let params = self.connection.params();
        let requested: Vec<String> = ATTRIBUTE_MAP
            .iter()
            .filter(|(raw, _)| *raw != "dn")
            .map(|(raw, _)| (*raw).to_string())
            .collect();

        let entries = self
            .connection
            .search(
                params.search_base(),
                SearchScope::Subtree,
                filter,
                &requested,
            )
            .await?;

        Ok(entries
            .first()
            .map(AttributeCollection::from_entry)
            .unwrap_or_default())
    }

    /// Runs a generic search, returning the match count and entries.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn get_objects(
        &self,
        filter: &str,
        attributes: &[String],
        search_base: Option<&str>,
    ) -> Result<SearchResult> {
        let params = self.connection.params();
        let base = search_base.unwrap_or_else(|| params.search_base());
        let entries = self
            .connection
            .search(base, SearchScope::Subtree, filter, attributes)
            .await?;
        Ok(SearchResult::new(entries))
    }
}
