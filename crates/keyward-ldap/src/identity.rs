//! Resolved directory identities.
//!
//! One [`IdentityRecord`] is produced per authentication attempt and
//! handed to the authentication orchestrator; it is immutable after
//! construction.

use crate::connection::LdapConnection;
use crate::schema::DirectorySchema;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use keyward_core::{DirectoryError, ResultCode};
use secrecy::SecretString;
use serde::Serialize;

/// A directory identity resolved for one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    dn: String,
    expiry: i64,
    in_group: bool,
}

impl IdentityRecord {
    /// Creates a resolved identity.
    #[must_use]
    pub const fn new(dn: String, expiry: i64, in_group: bool) -> Self {
        Self {
            dn,
            expiry,
            in_group,
        }
    }

    /// Distinguished name the user bound with.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Expiry timestamp in epoch seconds; 0 means the account never
    /// expires.
    #[must_use]
    pub const fn expiry(&self) -> i64 {
        self.expiry
    }

    /// Whether the user belongs to the required group.
    #[must_use]
    pub const fn is_in_group(&self) -> bool {
        self.in_group
    }

    /// True when no expiry is recorded.
    #[must_use]
    pub const fn never_expires(&self) -> bool {
        self.expiry == 0
    }

    /// Expiry as a UTC timestamp, when one is recorded and representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.expiry == 0 {
            return None;
        }
        Utc.timestamp_opt(self.expiry, 0).single()
    }
}

/// Resolves directory identities through a connected schema strategy.
pub struct IdentityResolver {
    schema: Box<dyn DirectorySchema>,
    connection: LdapConnection,
}

impl IdentityResolver {
    /// Creates a resolver over a connected schema and the connection used
    /// for credential verification.
    #[must_use]
    pub fn new(schema: Box<dyn DirectorySchema>, connection: LdapConnection) -> Self {
        Self { schema, connection }
    }

    /// Resolves the identity for `login`, verifying `password` against the
    /// directory.
    ///
    /// Performs, in order: one attribute search for the user entry, one
    /// bind as the resolved DN, and the group-membership decision (at most
    /// one further search).
    ///
    /// # Errors
    ///
    /// An unknown login is reported as an INVALID_CREDENTIALS-coded
    /// [`DirectoryError`], indistinguishable from a rejected password;
    /// bind and search failures propagate wrapped.
    pub async fn resolve(&self, login: &str, password: &SecretString) -> Result<IdentityRecord> {
        let user_filter = self.schema.user_dn_filter(login);
        let attributes = self.schema.actions().get_attributes(&user_filter).await?;

        let Some(dn) = attributes.single("dn").map(ToString::to_string) else {
            return Err(DirectoryError::new(
                format!("no directory entry for login `{login}`"),
                "no entries matched",
                ResultCode::InvalidCredentials,
            )
            .into());
        };

        let groups_dn = attributes.list("group");
        let expiry = attributes
            .single("expire")
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0);

        self.connection.connect(Some(&dn), Some(password)).await?;

        let in_group = self.schema.is_user_in_group(&dn, login, &groups_dn).await?;
        Ok(IdentityRecord::new(dn, expiry, in_group))
    }
}
