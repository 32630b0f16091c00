//! Directory authentication and group-membership resolution for Keyward.
//!
//! This crate binds against an external LDAP-compatible directory,
//! resolves user entries and their group membership under the generic and
//! Active Directory schema conventions, and produces the resolved identity
//! consumed by the authentication orchestrator.

#![deny(missing_docs)]

mod actions;
mod connection;
mod filter;
mod identity;
mod params;
mod schema;
#[cfg(test)]
mod testing;

pub use actions::{AttributeCollection, AttributeValue, LdapActions, SearchResult};
pub use connection::{LdapConnection, LdapEntry, SearchScope};
pub use filter::{attributes_for_filter, group_name_from_dn};
pub use identity::{IdentityRecord, IdentityResolver};
pub use params::{
    DirectoryConfig, DirectoryType, LdapParams, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_RECONNECT_ATTEMPTS,
};
pub use schema::{connect_schema, ActiveDirectorySchema, DirectorySchema, StandardSchema};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = keyward_core::Result<T>;
