//! Active Directory schema strategy.
//!
//! Differs from the generic schema in three ways: user filtering excludes
//! disabled accounts through a bitwise matching rule on
//! `userAccountControl`, indirect membership additionally matches through
//! the transitive-chain rule, and server selection can discover domain
//! controllers through the `_msdcs` DNS zone.

use crate::actions::LdapActions;
use crate::filter;
use crate::params::LdapParams;
use crate::schema::{decide_membership, required_group, resolve_group_dn, DirectorySchema};
use crate::Result;
use async_trait::async_trait;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use keyward_core::EventSink;
use rand::seq::SliceRandom;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_USER_OBJECT_FILTER: &str = "(&(!(userAccountControl:1.2.840.113556.1.4.803:=32))\
                                          (|(objectCategory=person)(objectClass=user)))";
const DEFAULT_GROUP_OBJECT_FILTER: &str = "(objectCategory=group)";
const DEFAULT_USER_ATTRIBUTES: &[&str] = &["samaccountname", "cn", "uid", "userPrincipalName"];
const DIRECT_GROUP_ATTRIBUTES: &[&str] = &["memberOf", "groupMembership"];
// Transitive membership through the in-chain matching rule.
const NESTED_GROUP_ATTRIBUTE: &str = "memberOf:1.2.840.113556.1.4.1941:";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ControllerDiscovery: Send + Sync {
    async fn name_servers(&self, zone: &str) -> Vec<String>;
}

/// Discovery through the system resolver's NS records.
struct DnsControllerDiscovery;

#[async_trait]
impl ControllerDiscovery for DnsControllerDiscovery {
    async fn name_servers(&self, zone: &str) -> Vec<String> {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!("System resolver unavailable for controller discovery: {err}");
                return Vec::new();
            }
        };
        match resolver.lookup(zone, RecordType::NS).await {
            Ok(lookup) => lookup
                .iter()
                .filter_map(|record| match record {
                    RData::NS(ns) => Some(ns.0.to_utf8().trim_end_matches('.').to_string()),
                    _ => None,
                })
                .collect(),
            Err(err) => {
                warn!("Controller discovery for zone `{zone}` failed: {err}");
                Vec::new()
            }
        }
    }
}

/// Strategy for directories following the Active Directory schema.
pub struct ActiveDirectorySchema {
    events: Arc<dyn EventSink>,
    actions: LdapActions,
    params: LdapParams,
    discovery: Box<dyn ControllerDiscovery>,
}

impl ActiveDirectorySchema {
    /// Creates the Active Directory strategy with DNS-based controller
    /// discovery.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>, actions: LdapActions, params: LdapParams) -> Self {
        Self {
            events,
            actions,
            params,
            discovery: Box::new(DnsControllerDiscovery),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_discovery(
        events: Arc<dyn EventSink>,
        actions: LdapActions,
        params: LdapParams,
        discovery: Box<dyn ControllerDiscovery>,
    ) -> Self {
        Self {
            events,
            actions,
            params,
            discovery,
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

    fn direct_group_attributes(&self) -> Vec<String> {
        if self.params.group_attributes().is_empty() {
            DIRECT_GROUP_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.params.group_attributes().to_vec()
        }
    }

    fn indirect_group_attributes(&self) -> Vec<String> {
        if self.params.group_attributes().is_empty() {
            DIRECT_GROUP_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .chain(std::iter::once(NESTED_GROUP_ATTRIBUTE.to_string()))
                .collect()
        } else {
            self.params.group_attributes().to_vec()
        }
    }
}

#[async_trait]
impl DirectorySchema for ActiveDirectorySchema {
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
            filter::attributes_for_filter(&self.indirect_group_attributes(), &group_dn),
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
            &self.direct_group_attributes(),
            &self.group_object_filter(),
            user_dn,
            user_login,
            groups_dn,
        )
        .await
    }

    /// Selects a directory controller.
    ///
    /// A configured IPv4 literal is returned unchanged, with no lookup.
    /// Otherwise the `_msdcs` zone of the domain derived from the search
    /// base is queried for name-server records; an empty answer falls back
    /// to the configured server, and a non-empty answer yields a uniformly
    /// random controller name.
    async fn pick_server(&self) -> String {
        let server = self.params.server();
        if server.parse::<Ipv4Addr>().is_ok() {
            return server.to_string();
        }

        let Some(domain) = domain_from_search_base(self.params.search_base()) else {
            return server.to_string();
        };
        let zone = format!("_msdcs.{domain}");
        let controllers = self.discovery.name_servers(&zone).await;

        controllers
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| server.to_string())
    }

    fn actions(&self) -> &LdapActions {
        &self.actions
    }
}

/// Joins the `dc=` components of a search base into a DNS domain name.
fn domain_from_search_base(search_base: &str) -> Option<String> {
    let labels: Vec<&str> = search_base
        .split(',')
        .map(str::trim)
        .filter_map(|component| {
            component
                .split_once('=')
                .filter(|(attribute, _)| attribute.trim().eq_ignore_ascii_case("dc"))
                .map(|(_, value)| value.trim())
        })
        .filter(|value| !value.is_empty())
        .collect();

    if labels.is_empty() {
        None
    } else {
        Some(labels.join("."))
    }
}
