//! Generic LDAP schema strategy.

use crate::actions::LdapActions;
use crate::filter;
use crate::params::LdapParams;
use crate::schema::{decide_membership, required_group, resolve_group_dn, DirectorySchema};
use crate::Result;
use async_trait::async_trait;
use keyward_core::EventSink;
use std::sync::Arc;

const DEFAULT_USER_OBJECT_FILTER: &str =
    "(|(objectClass=inetOrgPerson)(objectClass=person)(objectClass=simpleSecurityObject))";
const DEFAULT_GROUP_OBJECT_FILTER: &str =
    "(|(objectClass=groupOfNames)(objectClass=groupOfUniqueNames)(objectClass=group))";
const DEFAULT_USER_ATTRIBUTES: &[&str] = &["uid", "samaccountname", "cn"];
const DEFAULT_GROUP_ATTRIBUTES: &[&str] = &["memberOf", "groupMembership"];

/// Strategy for directories following the generic LDAP schema.
pub struct StandardSchema {
    events: Arc<dyn EventSink>,
    actions: LdapActions,
    params: LdapParams,
}

impl StandardSchema {
    /// Creates the standard-schema strategy.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>, actions: LdapActions, params: LdapParams) -> Self {
        Self {
            events,
            actions,
            params,
        }
    }

    fn user_attributes(&self) -> Vec<String> {
        if self.params.user_attributes().is_empty() {
            DEFAULT_USER_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.params.user_attributes().to_vec()
        }
    }

    fn group_attributes(&self) -> Vec<String> {
        if self.params.group_attributes().is_empty() {
            DEFAULT_GROUP_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.params.group_attributes().to_vec()
        }
    }
}

#[async_trait]
impl DirectorySchema for StandardSchema {
    fn user_object_filter(&self) -> String {
        self.params
            .user_object_filter()
            .unwrap_or(DEFAULT_USER_OBJECT_FILTER)
            .to_string()
    }

    fn user_dn_filter(&self, login: &str) -> String {
        format!(
            "(&(|{}){})",
            filter::attributes_for_filter(&self.user_attributes(), login),
            self.user_object_filter()
        )
    }

    fn group_object_filter(&self) -> String {
        self.params
            .group_object_filter()
            .unwrap_or(DEFAULT_GROUP_OBJECT_FILTER)
            .to_string()
    }

    async fn group_membership_indirect_filter(&self) -> Result<String> {
        let Some(group) = required_group(&self.params) else {
            return Ok(self.user_object_filter());
        };
        let group_dn =
            resolve_group_dn(&self.actions, group, &self.group_object_filter()).await?;
        Ok(format!(
            "(&(|{}){})",
            filter::attributes_for_filter(&self.group_attributes(), &group_dn),
            self.user_object_filter()
        ))
    }

    async fn is_user_in_group(
        &self,
        user_dn: &str,
        user_login: &str,
        groups_dn: &[String],
    ) -> Result<bool> {
        decide_membership(
            &self.events,
            &self.actions,
            &self.params,
            &self.group_attributes(),
            &self.group_object_filter(),
            user_dn,
            user_login,
            groups_dn,
        )
        .await
    }

    async fn pick_server(&self) -> String {
        self.params.server().to_string()
    }

    fn actions(&self) -> &LdapActions {
        &self.actions
    }
}
