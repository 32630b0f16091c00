//! Schema-specific directory strategies.
//!
//! The two supported schema conventions diverge in how users and groups
//! are filtered and how membership is expressed, so each is an independent
//! [`DirectorySchema`] implementation behind a factory keyed on the
//! configured directory type.

mod active_directory;
mod standard;

pub use active_directory::ActiveDirectorySchema;
pub use standard::StandardSchema;

use crate::actions::LdapActions;
use crate::connection::LdapConnection;
use crate::filter;
use crate::params::{DirectoryType, LdapParams};
use crate::Result;
use async_trait::async_trait;
use keyward_core::{Error, EventMessage, EventSink};
use std::sync::Arc;

/// Schema-specific filter construction and the group-membership decision.
#[async_trait]
pub trait DirectorySchema: Send {
    /// Filter matching user objects of this schema.
    fn user_object_filter(&self) -> String;

    /// Filter locating the user entry for `login`.
    fn user_dn_filter(&self, login: &str) -> String;

    /// Filter matching group objects of this schema.
    fn group_object_filter(&self) -> String;

    /// Filter matching users that belong, directly or indirectly, to the
    /// configured group. Without a configured group this is the bare user
    /// object filter.
    ///
    /// # Errors
    ///
    /// Propagates group resolution failures.
    async fn group_membership_indirect_filter(&self) -> Result<String>;

    /// Decides whether the user belongs to the required group.
    ///
    /// # Errors
    ///
    /// Propagates group resolution and search failures.
    async fn is_user_in_group(
        &self,
        user_dn: &str,
        user_login: &str,
        groups_dn: &[String],
    ) -> Result<bool>;

    /// Selects the directory server to connect to.
    async fn pick_server(&self) -> String;

    /// The actions layer this schema searches through.
    fn actions(&self) -> &LdapActions;
}

/// Connects and returns the schema implementation for the configured
/// directory type.
///
/// # Errors
///
/// Returns the bind failure from [`LdapConnection::connect`], or
/// [`Error::NotImplemented`] for directory types without an engine
/// implementation.
pub async fn connect_schema(
    events: Arc<dyn EventSink>,
    connection: &LdapConnection,
    actions: LdapActions,
    params: LdapParams,
) -> Result<Box<dyn DirectorySchema>> {
    connection.connect(None, None).await?;

    match params.directory_type() {
        DirectoryType::Standard => Ok(Box::new(StandardSchema::new(events, actions, params))),
        DirectoryType::ActiveDirectory => {
            Ok(Box::new(ActiveDirectorySchema::new(events, actions, params)))
        }
        DirectoryType::Azure => Err(Error::NotImplemented(
            "no schema implementation for the azure directory type".to_string(),
        )),
    }
}

/// Returns the configured group when membership is actually required;
/// empty and wildcard configurations require none.
pub(crate) fn required_group(params: &LdapParams) -> Option<&str> {
    let group = params.group();
    if group.is_empty() || group == "*" {
        None
    } else {
        Some(group)
    }
}

/// Resolves the configured group to its full DN. A DN-shaped
/// configuration resolves to itself without a search; a bare name goes
/// through the group search, taking the first match.
pub(crate) async fn resolve_group_dn(
    actions: &LdapActions,
    group: &str,
    group_object_filter: &str,
) -> Result<String> {
    if group.contains('=') {
        return Ok(group.to_string());
    }
    let dns = actions
        .search_groups_dn(Some(group_object_filter))
        .await?;
    // search_groups_dn errors on zero matches, so the list is non-empty.
    Ok(dns.into_iter().next().unwrap_or_else(|| group.to_string()))
}

/// The membership decision shared by both schema variants.
///
/// Immediately true when no group is required or the resolved group DN is
/// already among the caller-supplied `groups_dn`; otherwise a single
/// direct-membership search scoped to the user DN decides.
pub(crate) async fn decide_membership(
    events: &Arc<dyn EventSink>,
    actions: &LdapActions,
    params: &LdapParams,
    membership_attributes: &[String],
    group_object_filter: &str,
    user_dn: &str,
    user_login: &str,
    groups_dn: &[String],
) -> Result<bool> {
    let Some(group) = required_group(params) else {
        events.emit(
            EventMessage::new("ldap.check.group", "No group membership required")
                .detail("User", user_login),
        );
        return Ok(true);
    };

    let group_dn = resolve_group_dn(actions, group, group_object_filter).await?;

    if groups_dn
        .iter()
        .any(|dn| dn.eq_ignore_ascii_case(&group_dn))
    {
        events.emit(
            EventMessage::new("ldap.check.group", "Group membership verified")
                .detail("User", user_login)
                .detail("Group", &group_dn),
        );
        return Ok(true);
    }

    let membership_filter = format!(
        "(|{})",
        filter::attributes_for_filter(membership_attributes, &group_dn)
    );
    let result = actions
        .get_objects(&membership_filter, &["dn".to_string()], Some(user_dn))
        .await?;

    if result.count() == 0 {
        events.emit(
            EventMessage::new("ldap.check.group", "User is not in the required group")
                .detail("User", user_login)
                .detail("Group", &group_dn)
                .detail("LDAP FILTER", &membership_filter),
        );
        Ok(false)
    } else {
        events.emit(
            EventMessage::new("ldap.check.group", "Group membership verified")
                .detail("User", user_login)
                .detail("Group", &group_dn),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MockLdapConnector, MockLdapSession};
    use crate::testing::{sample_params, RecordingEventSink};

    fn connection_that_binds(sink: Arc<RecordingEventSink>, params: LdapParams) -> LdapConnection {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().return_once(|| {
            let mut session = MockLdapSession::new();
            session.expect_simple_bind().returning(|_, _| Ok(()));
            Ok(Box::new(session))
        });
        LdapConnection::with_connector(params, sink, Arc::new(connector))
    }

    #[tokio::test]
    async fn factory_connects_and_selects_the_standard_variant() {
        let sink = RecordingEventSink::new();
        let params = sample_params();
        let connection = connection_that_binds(sink.clone(), params.clone());
        let actions = LdapActions::new(connection.clone(), sink.clone());

        let schema = connect_schema(sink.clone(), &connection, actions, params)
            .await
            .unwrap();
        assert!(connection.is_bound().await);
        assert!(schema.user_object_filter().contains("objectClass=inetOrgPerson"));
        assert!(sink.find("ldap.bind").is_some());
    }

    #[tokio::test]
    async fn factory_selects_the_active_directory_variant() {
        let sink = RecordingEventSink::new();
        let params = sample_params().with_directory_type(DirectoryType::ActiveDirectory);
        let connection = connection_that_binds(sink.clone(), params.clone());
        let actions = LdapActions::new(connection.clone(), sink.clone());

        let schema = connect_schema(sink, &connection, actions, params).await.unwrap();
        assert!(schema.user_object_filter().contains("objectCategory=person"));
    }

    #[tokio::test]
    async fn factory_rejects_unimplemented_directory_types() {
        let sink = RecordingEventSink::new();
        let params = sample_params().with_directory_type(DirectoryType::Azure);
        let connection = connection_that_binds(sink.clone(), params.clone());
        let actions = LdapActions::new(connection.clone(), sink.clone());

        let err = match connect_schema(sink, &connection, actions, params).await {
            Ok(_) => panic!("expected connect_schema to return an error"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn required_group_treats_empty_and_wildcard_as_none() {
        assert_eq!(required_group(&sample_params().with_group("")), None);
        assert_eq!(required_group(&sample_params().with_group("*")), None);
        assert_eq!(
            required_group(&sample_params().with_group("Admins")),
            Some("Admins")
        );
    }
}
