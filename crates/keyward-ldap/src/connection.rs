//! Directory connection management.
//!
//! [`LdapConnection`] owns the bind state for one authentication attempt:
//! it starts Unconnected, becomes Bound after a successful `connect`, and a
//! failed bind leaves it Unconnected with the error surfaced to the caller.
//! The transport and protocol primitives sit behind the [`LdapSession`] /
//! [`LdapConnector`] seam so tests can drive the engine without a server.

use crate::params::LdapParams;
use crate::Result;
use async_trait::async_trait;
use keyward_core::{DirectoryError, Error, EventMessage, EventSink, ResultCode};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::TlsConnector;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Represents the search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Directory entry representation used by the engine.
#[derive(Debug, Clone)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (value order preserved from the server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .map(|values| values.as_slice())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory connection scoped to one [`LdapParams`] set.
#[derive(Clone)]
pub struct LdapConnection {
    params: Arc<LdapParams>,
    events: Arc<dyn EventSink>,
    connector: Arc<dyn LdapConnector>,
    session: Arc<Mutex<Option<Box<dyn LdapSession>>>>,
}

impl LdapConnection {
    /// Creates an Unconnected connection using the real directory
    /// transport.
    #[must_use]
    pub fn new(params: LdapParams, events: Arc<dyn EventSink>) -> Self {
        let params = Arc::new(params);
        let connector: Arc<dyn LdapConnector> = Arc::new(RealLdapConnector::new(params.clone()));
        Self {
            params,
            events,
            connector,
            session: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_connector(
        params: LdapParams,
        events: Arc<dyn EventSink>,
        connector: Arc<dyn LdapConnector>,
    ) -> Self {
        Self {
            params: Arc::new(params),
            events,
            connector,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// The parameters this connection is scoped to.
    #[must_use]
    pub fn params(&self) -> &LdapParams {
        &self.params
    }

    /// Binds with the supplied credentials, or the configured ones when
    /// absent.
    ///
    /// The transport is established with a bounded attempt loop; the bind
    /// itself is issued once. On success the connection becomes Bound and
    /// an `ldap.bind` event is emitted. On failure the native error is
    /// wrapped into a [`DirectoryError`], an `exception` event carrying the
    /// attempted DN (never the password) is emitted, and the connection
    /// stays Unconnected.
    ///
    /// # Errors
    ///
    /// Returns the wrapped bind or transport failure.
    pub async fn connect(
        &self,
        bind_dn: Option<&str>,
        bind_pass: Option<&SecretString>,
    ) -> Result<()> {
        let dn = bind_dn.unwrap_or_else(|| self.params.bind_dn());
        let pass = bind_pass.unwrap_or_else(|| self.params.bind_pass());

        let mut session = match self.establish().await {
            Ok(session) => session,
            Err(err) => {
                self.events.emit(
                    EventMessage::new("exception", "Directory connection failed")
                        .detail("Server", self.params.url())
                        .detail("LDAP ERROR", native_text(&err)),
                );
                return Err(err);
            }
        };
        match session.simple_bind(dn, pass.expose_secret()).await {
            Ok(()) => {
                self.events.emit(
                    EventMessage::new("ldap.bind", "Directory bind succeeded")
                        .detail("DN", dn)
                        .detail("Server", self.params.url()),
                );
                *self.session.lock().await = Some(session);
                Ok(())
            }
            Err(err) => {
                self.events.emit(
                    EventMessage::new("exception", "Directory bind failed")
                        .detail("DN", dn)
                        .detail("LDAP ERROR", native_text(&err)),
                );
                Err(err)
            }
        }
    }

    /// Verifies connectivity by binding with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns the wrapped bind or transport failure.
    pub async fn check_connection(&self) -> Result<()> {
        self.connect(None, None).await?;
        self.events.emit(
            EventMessage::new("ldap.check.connection", "Directory connection verified")
                .detail("Server", self.params.url()),
        );
        Ok(())
    }

    /// Returns a new Unconnected connection scoped to different
    /// parameters. No bound state is shared with the original.
    #[must_use]
    pub fn mutate(&self, params: LdapParams) -> Self {
        Self::new(params, self.events.clone())
    }

    /// Whether the connection is currently Bound.
    pub async fn is_bound(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Runs a search on the bound session.
    ///
    /// # Errors
    ///
    /// Returns an OPERATIONS_ERROR-coded [`DirectoryError`] when the
    /// connection is Unconnected, otherwise any search failure.
    pub async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| {
            Error::from(DirectoryError::new(
                "search attempted on an unbound connection",
                "not bound",
                ResultCode::OperationsError,
            ))
        })?;
        session.search(base_dn, scope, filter, attributes).await
    }

    /// Releases the bound session, returning the connection to
    /// Unconnected.
    ///
    /// # Errors
    ///
    /// Returns any unbind failure reported by the directory.
    pub async fn unbind(&self) -> Result<()> {
        if let Some(mut session) = self.session.lock().await.take() {
            session.unbind().await?;
        }
        Ok(())
    }

    async fn establish(&self) -> Result<Box<dyn LdapSession>> {
        let attempts = self.params.reconnect_attempts().max(1);
        let mut last_error = None;
        for _ in 0..attempts {
            match self.connector.connect().await {
                Ok(session) => return Ok(session),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::Timeout(format!(
                "no transport attempt against {} completed",
                self.params.url()
            ))
        }))
    }
}

/// Real directory connector backed by `ldap3`.
struct RealLdapConnector {
    params: Arc<LdapParams>,
}

impl RealLdapConnector {
    fn new(params: Arc<LdapParams>) -> Self {
        Self { params }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_settings(&self.params)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.params.url())
            .await
            .map_err(|err| map_ldap_error("directory connection failed", err))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.params.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| map_ldap_error("directory bind rejected", err))?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let result = timeout(
            self.operation_timeout,
            self.inner
                .search(base_dn, scope.into(), filter, attributes.to_vec()),
        )
        .await
        .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
        .map_err(|err| map_ldap_error("directory search failed", err))?;
        let (entries, _) = result
            .success()
            .map_err(|err| map_ldap_error("directory search failed", err))?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(|err| map_ldap_error("directory unbind failed", err))?;
        Ok(())
    }
}

fn build_settings(params: &LdapParams) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(params.connection_timeout());

    if params.tls_enabled() && params.scheme() == "ldap" {
        settings = settings.set_starttls(true);
    }

    if !params.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    }

    Ok(settings)
}

fn map_ldap_error(message: &str, err: ldap3::LdapError) -> Error {
    match err {
        ldap3::LdapError::LdapResult { result } => DirectoryError::new(
            message,
            result.text.clone(),
            ResultCode::from_native(i32::try_from(result.rc).unwrap_or(i32::MAX)),
        )
        .into(),
        other => DirectoryError::new(message, other.to_string(), ResultCode::OperationsError)
            .with_cause(other.to_string())
            .into(),
    }
}

fn native_text(err: &Error) -> String {
    match err {
        Error::Directory(dir) => dir.native_message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_params, RecordingEventSink};

    fn bind_failure() -> Error {
        DirectoryError::new(
            "directory bind rejected",
            "invalid credentials supplied",
            ResultCode::InvalidCredentials,
        )
        .into()
    }

    #[tokio::test]
    async fn connect_binds_with_configured_credentials() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().times(1).return_once(|| {
            let mut session = MockLdapSession::new();
            session
                .expect_simple_bind()
                .withf(|dn, pass| dn == "cn=reader,dc=example,dc=com" && pass == "hunter2")
                .times(1)
                .returning(|_, _| Ok(()));
            Ok(Box::new(session))
        });

        let connection =
            LdapConnection::with_connector(sample_params(), sink.clone(), Arc::new(connector));
        connection.connect(None, None).await.unwrap();

        assert!(connection.is_bound().await);
        let event = sink.find("ldap.bind").unwrap();
        assert_eq!(
            event.detail_value("DN"),
            Some("cn=reader,dc=example,dc=com")
        );
    }

    #[tokio::test]
    async fn failed_bind_leaves_connection_unbound_and_emits_exception() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().return_once(|| {
            let mut session = MockLdapSession::new();
            session
                .expect_simple_bind()
                .returning(|_, _| Err(bind_failure()));
            Ok(Box::new(session))
        });

        let connection =
            LdapConnection::with_connector(sample_params(), sink.clone(), Arc::new(connector));
        let err = connection.connect(None, None).await.unwrap_err();

        assert_eq!(
            err.directory_code(),
            Some(ResultCode::InvalidCredentials)
        );
        assert!(!connection.is_bound().await);

        let event = sink.find("exception").unwrap();
        assert_eq!(
            event.detail_value("DN"),
            Some("cn=reader,dc=example,dc=com")
        );
        assert_eq!(
            event.detail_value("LDAP ERROR"),
            Some("invalid credentials supplied")
        );
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(!serialized.contains("hunter2"));
    }

    #[tokio::test]
    async fn transport_attempts_are_bounded_and_retried() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        let mut sequence = mockall::Sequence::new();
        for _ in 0..2 {
            connector
                .expect_connect()
                .times(1)
                .in_sequence(&mut sequence)
                .returning(|| {
                    Err(DirectoryError::new(
                        "directory connection failed",
                        "connection refused",
                        ResultCode::OperationsError,
                    )
                    .into())
                });
        }
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(|| {
                let mut session = MockLdapSession::new();
                session.expect_simple_bind().returning(|_, _| Ok(()));
                Ok(Box::new(session))
            });

        let connection =
            LdapConnection::with_connector(sample_params(), sink, Arc::new(connector));
        connection.connect(None, None).await.unwrap();
        assert!(connection.is_bound().await);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_after_final_attempt() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().times(3).returning(|| {
            Err(DirectoryError::new(
                "directory connection failed",
                "connection refused",
                ResultCode::OperationsError,
            )
            .into())
        });

        let connection =
            LdapConnection::with_connector(sample_params(), sink, Arc::new(connector));
        let err = connection.connect(None, None).await.unwrap_err();
        assert_eq!(err.directory_code(), Some(ResultCode::OperationsError));
    }

    #[tokio::test]
    async fn check_connection_emits_success_event() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().return_once(|| {
            let mut session = MockLdapSession::new();
            session.expect_simple_bind().returning(|_, _| Ok(()));
            Ok(Box::new(session))
        });

        let connection =
            LdapConnection::with_connector(sample_params(), sink.clone(), Arc::new(connector));
        connection.check_connection().await.unwrap();
        assert!(sink.find("ldap.check.connection").is_some());
    }

    #[tokio::test]
    async fn search_on_unbound_connection_is_an_operations_error() {
        let sink = RecordingEventSink::new();
        let connector = MockLdapConnector::new();
        let connection =
            LdapConnection::with_connector(sample_params(), sink, Arc::new(connector));

        let err = connection
            .search(
                "dc=example,dc=com",
                SearchScope::Subtree,
                "(cn=jdoe)",
                &["cn".to_string()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.directory_code(), Some(ResultCode::OperationsError));
    }

    #[tokio::test]
    async fn mutate_produces_an_unbound_connection() {
        let sink = RecordingEventSink::new();
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().return_once(|| {
            let mut session = MockLdapSession::new();
            session.expect_simple_bind().returning(|_, _| Ok(()));
            Ok(Box::new(session))
        });

        let connection =
            LdapConnection::with_connector(sample_params(), sink, Arc::new(connector));
        connection.connect(None, None).await.unwrap();

        let mutated = connection.mutate(sample_params().with_group("Admins"));
        assert!(!mutated.is_bound().await);
        assert_eq!(mutated.params().group(), "Admins");
        assert!(connection.is_bound().await);
    }
}
