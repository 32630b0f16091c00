//! Connection parameters for the directory engine.
//!
//! [`LdapParams`] is the immutable, validated form of the host
//! application's directory configuration. It is built once per
//! authentication attempt from a [`DirectoryConfig`] and never mutated
//! afterwards; the fluent `with_*` setters exist only for assembly.

use keyward_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default directory port.
pub const DEFAULT_PORT: u16 = 389;
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default per-operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default bounded transport attempt count.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

// Accepts `host`, `host:port`, `scheme://host` and `scheme://host:port`.
static SERVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://)?(?P<host>[^\s:/]+)(?::(?P<port>\d{1,5}))?$")
        .expect("server pattern is valid")
});

/// Schema convention spoken by the configured directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryType {
    /// Generic LDAP schema (inetOrgPerson-style entries).
    #[default]
    Standard,
    /// Active Directory schema.
    ActiveDirectory,
    /// Azure-hosted directories; accepted in configuration, not implemented.
    Azure,
}

/// Raw directory configuration as exposed by the host configuration
/// provider.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Server value in the form `(scheme://)?host(:port)?`.
    #[validate(length(min = 1))]
    pub server: String,

    /// Directory schema convention.
    #[serde(rename = "type", default)]
    pub directory_type: DirectoryType,

    /// DN the engine binds with for lookups.
    #[validate(length(min = 1))]
    pub bind_dn: String,

    /// Password for the bind DN.
    pub bind_pass: SecretString,

    /// Search base for user and group lookups.
    #[validate(length(min = 1))]
    pub search_base: String,

    /// Required group: a name, a full DN, `*` for any, or empty for none.
    #[serde(default)]
    pub group: String,

    /// Request a STARTTLS upgrade on plain connections.
    #[serde(default)]
    pub tls_enabled: bool,

    /// Verify the server certificate when TLS is in use.
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Replacement for the built-in user object filter.
    #[serde(default)]
    pub user_object_filter: Option<String>,

    /// Replacement for the built-in group object filter.
    #[serde(default)]
    pub group_object_filter: Option<String>,

    /// Replacement for the built-in login-identifying attributes.
    #[serde(default)]
    pub user_attributes: Vec<String>,

    /// Replacement for the built-in group-membership attributes.
    #[serde(default)]
    pub group_attributes: Vec<String>,
}

fn default_tls_verify() -> bool {
    true
}

/// Immutable connection parameters for one authentication attempt.
#[derive(Debug, Clone)]
pub struct LdapParams {
    scheme: String,
    server: String,
    port: u16,
    url: String,
    directory_type: DirectoryType,
    bind_dn: String,
    bind_pass: SecretString,
    search_base: String,
    group: String,
    tls_enabled: bool,
    tls_verify: bool,
    user_object_filter: Option<String>,
    group_object_filter: Option<String>,
    user_attributes: Vec<String>,
    group_attributes: Vec<String>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
    reconnect_attempts: u32,
}

impl LdapParams {
    /// Builds parameters from the raw configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] when a required field is empty,
    /// the server value does not match `(scheme://)?host(:port)?`, the
    /// scheme is not `ldap`/`ldaps`, or the port is out of range. No
    /// network I/O is attempted.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        config.validate()?;

        let raw = config.server.trim();
        let caps = SERVER_RE.captures(raw).ok_or_else(|| {
            Error::ValidationError(format!("unparsable directory server value `{raw}`"))
        })?;

        let scheme = caps
            .name("scheme")
            .map_or_else(|| "ldap".to_string(), |m| m.as_str().to_ascii_lowercase());
        if scheme != "ldap" && scheme != "ldaps" {
            return Err(Error::ValidationError(format!(
                "unsupported directory scheme `{scheme}`"
            )));
        }

        let server = caps["host"].to_string();
        let port = match caps.name("port") {
            Some(m) => m.as_str().parse::<u16>().map_err(|_| {
                Error::ValidationError(format!("directory port `{}` out of range", m.as_str()))
            })?,
            None => DEFAULT_PORT,
        };

        let url = format!("{scheme}://{server}:{port}");
        Url::parse(&url)?;

        Ok(Self {
            scheme,
            server,
            port,
            url,
            directory_type: config.directory_type,
            bind_dn: config.bind_dn.clone(),
            bind_pass: config.bind_pass.clone(),
            search_base: config.search_base.clone(),
            group: config.group.trim().to_string(),
            tls_enabled: config.tls_enabled,
            tls_verify: config.tls_verify,
            user_object_filter: none_if_empty(config.user_object_filter.as_deref()),
            group_object_filter: none_if_empty(config.group_object_filter.as_deref()),
            user_attributes: config.user_attributes.clone(),
            group_attributes: config.group_attributes.clone(),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        })
    }

    /// Resolved server host. Never empty.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Endpoint scheme, `ldap` or `ldaps`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Directory port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Composed endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Configured schema convention.
    #[must_use]
    pub const fn directory_type(&self) -> DirectoryType {
        self.directory_type
    }

    /// DN used for lookup binds.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Password for the bind DN.
    #[must_use]
    pub const fn bind_pass(&self) -> &SecretString {
        &self.bind_pass
    }

    /// Search base for user and group lookups.
    #[must_use]
    pub fn search_base(&self) -> &str {
        &self.search_base
    }

    /// Required group name, DN, `*`, or empty.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Whether a STARTTLS upgrade is requested on plain connections.
    #[must_use]
    pub const fn tls_enabled(&self) -> bool {
        self.tls_enabled
    }

    /// Whether server certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Override for the user object filter, when configured.
    #[must_use]
    pub fn user_object_filter(&self) -> Option<&str> {
        self.user_object_filter.as_deref()
    }

    /// Override for the group object filter, when configured.
    #[must_use]
    pub fn group_object_filter(&self) -> Option<&str> {
        self.group_object_filter.as_deref()
    }

    /// Override for the login-identifying attributes.
    #[must_use]
    pub fn user_attributes(&self) -> &[String] {
        &self.user_attributes
    }

    /// Override for the group-membership attributes.
    #[must_use]
    pub fn group_attributes(&self) -> &[String] {
        &self.group_attributes
    }

    /// Transport connect timeout.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-operation timeout.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Bounded transport attempt count.
    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Replaces the server host, keeping scheme and port.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self.url = format!("{}://{}:{}", self.scheme, self.server, self.port);
        self
    }

    /// Overrides the required group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Overrides the directory schema convention.
    #[must_use]
    pub const fn with_directory_type(mut self, directory_type: DirectoryType) -> Self {
        self.directory_type = directory_type;
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the per-operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Overrides the bounded transport attempt count.
    #[must_use]
    pub const fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }
}

fn none_if_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
