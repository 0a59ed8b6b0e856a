//! Declared cloud resources.
//!
//! Every spec is generic over the type of its deferred fields: `Input` while
//! declared (values may still reference other resources' outputs) and
//! `String` once resolved against the outputs of active resources.

use std::fmt;

use forge_core::{CoreResult, Declaration, Input, OutputRef, ResolvedOutputs};
use serde::{Deserialize, Serialize};

use crate::lookup::Tags;

/// Attribute names reported by created resources.
pub mod attrs {
    pub const ID: &str = "id";
    pub const ARN: &str = "arn";
    pub const NAME: &str = "name";
    pub const DNS_NAME: &str = "dns_name";
    pub const PUBLIC_DNS: &str = "public_dns";
    pub const PUBLIC_IP: &str = "public_ip";
    pub const PRIVATE_IP: &str = "private_ip";
    pub const TARGET_GROUP_ARN: &str = "target_group_arn";
    pub const TARGET_ID: &str = "target_id";
}

/// CIDR block matching every IPv4 address.
pub const ANYWHERE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    /// Every protocol and port
    All,
}

impl RuleProtocol {
    /// Protocol name as the cloud API expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleProtocol::Tcp => "tcp",
            RuleProtocol::Udp => "udp",
            RuleProtocol::All => "-1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Cidr(String),
    /// Members of the group the rule belongs to
    SelfGroup,
}

/// A single ingress or egress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub protocol: RuleProtocol,
    pub from_port: i32,
    pub to_port: i32,
    pub source: RuleSource,
}

impl SecurityRule {
    pub fn tcp_from_anywhere(port: i32) -> Self {
        Self {
            protocol: RuleProtocol::Tcp,
            from_port: port,
            to_port: port,
            source: RuleSource::Cidr(ANYWHERE.to_string()),
        }
    }

    pub fn all_from_self() -> Self {
        Self {
            protocol: RuleProtocol::All,
            from_port: 0,
            to_port: 0,
            source: RuleSource::SelfGroup,
        }
    }

    pub fn all_to_anywhere() -> Self {
        Self {
            protocol: RuleProtocol::All,
            from_port: 0,
            to_port: 0,
            source: RuleSource::Cidr(ANYWHERE.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec<V = Input> {
    pub name: String,
    pub description: String,
    pub vpc_id: V,
    pub ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootVolume {
    pub size_gib: i32,
    pub volume_type: String,
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec<V = Input> {
    pub ami: V,
    pub instance_type: String,
    pub root_volume: RootVolume,
    pub user_data: String,
    pub key_name: String,
    pub security_group_ids: Vec<V>,
    pub subnet_id: V,
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerType {
    Application,
    Network,
}

impl LoadBalancerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancerType::Application => "application",
            LoadBalancerType::Network => "network",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec<V = Input> {
    pub name: String,
    pub internal: bool,
    pub load_balancer_type: LoadBalancerType,
    pub security_groups: Vec<V>,
    pub subnets: Vec<V>,
    pub enable_deletion_protection: bool,
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Https => "HTTPS",
        }
    }
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Instance,
    Ip,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Instance => "instance",
            TargetType::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec<V = Input> {
    pub name: String,
    pub port: i32,
    pub protocol: ListenerProtocol,
    pub target_type: TargetType,
    pub vpc_id: V,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupAttachmentSpec<V = Input> {
    pub target_group_arn: V,
    pub target_id: V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectStatus {
    #[serde(rename = "HTTP_301")]
    Permanent,
    #[serde(rename = "HTTP_302")]
    Temporary,
}

impl RedirectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectStatus::Permanent => "HTTP_301",
            RedirectStatus::Temporary => "HTTP_302",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerAction<V = Input> {
    Redirect {
        protocol: ListenerProtocol,
        port: String,
        status_code: RedirectStatus,
    },
    Forward {
        target_group_arn: V,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec<V = Input> {
    pub load_balancer_arn: V,
    pub port: i32,
    pub protocol: ListenerProtocol,
    pub ssl_policy: Option<String>,
    pub certificate_arn: Option<V>,
    pub default_actions: Vec<ListenerAction<V>>,
}

fn refs<'a>(inputs: impl IntoIterator<Item = &'a Input>) -> Vec<&'a OutputRef> {
    inputs.into_iter().filter_map(Input::output_ref).collect()
}

impl SecurityGroupSpec {
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<SecurityGroupSpec<String>> {
        Ok(SecurityGroupSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            vpc_id: outputs.resolve(&self.vpc_id)?,
            ingress: self.ingress.clone(),
            egress: self.egress.clone(),
            tags: self.tags.clone(),
        })
    }
}

impl InstanceSpec {
    fn inputs(&self) -> impl Iterator<Item = &Input> {
        [&self.ami, &self.subnet_id]
            .into_iter()
            .chain(self.security_group_ids.iter())
    }

    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<InstanceSpec<String>> {
        Ok(InstanceSpec {
            ami: outputs.resolve(&self.ami)?,
            instance_type: self.instance_type.clone(),
            root_volume: self.root_volume.clone(),
            user_data: self.user_data.clone(),
            key_name: self.key_name.clone(),
            security_group_ids: outputs.resolve_all(&self.security_group_ids)?,
            subnet_id: outputs.resolve(&self.subnet_id)?,
            tags: self.tags.clone(),
        })
    }
}

impl LoadBalancerSpec {
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<LoadBalancerSpec<String>> {
        Ok(LoadBalancerSpec {
            name: self.name.clone(),
            internal: self.internal,
            load_balancer_type: self.load_balancer_type,
            security_groups: outputs.resolve_all(&self.security_groups)?,
            subnets: outputs.resolve_all(&self.subnets)?,
            enable_deletion_protection: self.enable_deletion_protection,
            tags: self.tags.clone(),
        })
    }
}

impl TargetGroupSpec {
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<TargetGroupSpec<String>> {
        Ok(TargetGroupSpec {
            name: self.name.clone(),
            port: self.port,
            protocol: self.protocol,
            target_type: self.target_type,
            vpc_id: outputs.resolve(&self.vpc_id)?,
            tags: self.tags.clone(),
        })
    }
}

impl TargetGroupAttachmentSpec {
    pub fn resolve(
        &self,
        outputs: &ResolvedOutputs,
    ) -> CoreResult<TargetGroupAttachmentSpec<String>> {
        Ok(TargetGroupAttachmentSpec {
            target_group_arn: outputs.resolve(&self.target_group_arn)?,
            target_id: outputs.resolve(&self.target_id)?,
        })
    }
}

impl ListenerAction {
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<ListenerAction<String>> {
        Ok(match self {
            ListenerAction::Redirect {
                protocol,
                port,
                status_code,
            } => ListenerAction::Redirect {
                protocol: *protocol,
                port: port.clone(),
                status_code: *status_code,
            },
            ListenerAction::Forward { target_group_arn } => ListenerAction::Forward {
                target_group_arn: outputs.resolve(target_group_arn)?,
            },
        })
    }
}

impl ListenerSpec {
    fn inputs(&self) -> impl Iterator<Item = &Input> {
        std::iter::once(&self.load_balancer_arn)
            .chain(self.certificate_arn.iter())
            .chain(self.default_actions.iter().filter_map(|a| match a {
                ListenerAction::Forward { target_group_arn } => Some(target_group_arn),
                ListenerAction::Redirect { .. } => None,
            }))
    }

    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<ListenerSpec<String>> {
        Ok(ListenerSpec {
            load_balancer_arn: outputs.resolve(&self.load_balancer_arn)?,
            port: self.port,
            protocol: self.protocol,
            ssl_policy: self.ssl_policy.clone(),
            certificate_arn: self
                .certificate_arn
                .as_ref()
                .map(|c| outputs.resolve(c))
                .transpose()?,
            default_actions: self
                .default_actions
                .iter()
                .map(|a| a.resolve(outputs))
                .collect::<CoreResult<_>>()?,
        })
    }
}

/// Any resource a stack can declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    SecurityGroup(SecurityGroupSpec),
    Instance(InstanceSpec),
    LoadBalancer(LoadBalancerSpec),
    TargetGroup(TargetGroupSpec),
    TargetGroupAttachment(TargetGroupAttachmentSpec),
    Listener(ListenerSpec),
}

/// A resource with every deferred value filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSpec {
    SecurityGroup(SecurityGroupSpec<String>),
    Instance(InstanceSpec<String>),
    LoadBalancer(LoadBalancerSpec<String>),
    TargetGroup(TargetGroupSpec<String>),
    TargetGroupAttachment(TargetGroupAttachmentSpec<String>),
    Listener(ListenerSpec<String>),
}

impl ResourceSpec {
    /// Substitute every output reference with its concrete value.
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> CoreResult<ResolvedSpec> {
        Ok(match self {
            ResourceSpec::SecurityGroup(s) => ResolvedSpec::SecurityGroup(s.resolve(outputs)?),
            ResourceSpec::Instance(s) => ResolvedSpec::Instance(s.resolve(outputs)?),
            ResourceSpec::LoadBalancer(s) => ResolvedSpec::LoadBalancer(s.resolve(outputs)?),
            ResourceSpec::TargetGroup(s) => ResolvedSpec::TargetGroup(s.resolve(outputs)?),
            ResourceSpec::TargetGroupAttachment(s) => {
                ResolvedSpec::TargetGroupAttachment(s.resolve(outputs)?)
            }
            ResourceSpec::Listener(s) => ResolvedSpec::Listener(s.resolve(outputs)?),
        })
    }
}

impl Declaration for ResourceSpec {
    fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::SecurityGroup(_) => "security_group",
            ResourceSpec::Instance(_) => "instance",
            ResourceSpec::LoadBalancer(_) => "load_balancer",
            ResourceSpec::TargetGroup(_) => "target_group",
            ResourceSpec::TargetGroupAttachment(_) => "target_group_attachment",
            ResourceSpec::Listener(_) => "listener",
        }
    }

    fn references(&self) -> Vec<&OutputRef> {
        match self {
            ResourceSpec::SecurityGroup(s) => refs([&s.vpc_id]),
            ResourceSpec::Instance(s) => refs(s.inputs()),
            ResourceSpec::LoadBalancer(s) => {
                refs(s.security_groups.iter().chain(s.subnets.iter()))
            }
            ResourceSpec::TargetGroup(s) => refs([&s.vpc_id]),
            ResourceSpec::TargetGroupAttachment(s) => refs([&s.target_group_arn, &s.target_id]),
            ResourceSpec::Listener(s) => refs(s.inputs()),
        }
    }
}
