//! In-memory cloud for previews and tests.
//!
//! Lookups are answered from seeded fixtures. Created resources live in
//! process memory and are checked for the referential constraints the real
//! cloud enforces, so a wrongly ordered apply or destroy fails here too.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_core::Attributes;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{IacError, IacResult};
use crate::lookup::{
    select_image, select_single, CertificateQuery, CertificateRef, ImageQuery, ImageRef,
    NetworkRef, SubnetQuery, SubnetSet, Tags, VpcQuery,
};
use crate::provider::{required_attribute, CloudApi, CloudBackend};
use crate::resources::{
    attrs, InstanceSpec, ListenerAction, ListenerProtocol, ListenerSpec, LoadBalancerSpec,
    SecurityGroupSpec, TargetGroupAttachmentSpec, TargetGroupSpec,
};

/// Account id used in simulated ARNs.
pub const SIMULATED_ACCOUNT: &str = "000000000000";

/// Longest name the cloud accepts for load balancers and target groups.
pub const MAX_ELB_NAME_LEN: usize = 32;

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone)]
struct SeededVpc {
    id: String,
    tags: Tags,
}

#[derive(Debug, Clone)]
struct SeededSubnet {
    id: String,
    vpc_id: String,
    tags: Tags,
}

#[derive(Debug, Clone)]
struct SeededImage {
    image: ImageRef,
    owner: String,
}

#[derive(Debug, Clone)]
struct SeededCertificate {
    certificate: CertificateRef,
    status: String,
}

#[derive(Debug, Default)]
struct Fixtures {
    vpcs: Vec<SeededVpc>,
    subnets: Vec<SeededSubnet>,
    images: Vec<SeededImage>,
    certificates: Vec<SeededCertificate>,
}

#[derive(Debug, Default)]
struct LiveResources {
    security_groups: BTreeMap<String, SecurityGroupSpec<String>>,
    instances: BTreeMap<String, InstanceSpec<String>>,
    load_balancers: BTreeMap<String, LoadBalancerSpec<String>>,
    target_groups: BTreeMap<String, TargetGroupSpec<String>>,
    attachments: BTreeSet<(String, String)>,
    listeners: BTreeMap<String, ListenerSpec<String>>,
}

impl LiveResources {
    fn count(&self) -> usize {
        self.security_groups.len()
            + self.instances.len()
            + self.load_balancers.len()
            + self.target_groups.len()
            + self.attachments.len()
            + self.listeners.len()
    }
}

fn tags_match(wanted: &Tags, actual: &Tags) -> bool {
    wanted.iter().all(|(k, v)| actual.get(k) == Some(v))
}

fn tagged(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Simulated cloud.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// inspection while the stack owns another.
#[derive(Clone)]
pub struct InMemoryCloud {
    region: String,
    fixtures: Arc<RwLock<Fixtures>>,
    live: Arc<RwLock<LiveResources>>,
    counter: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Method name to failure message.
    failures: Arc<RwLock<HashMap<String, String>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    /// Create an empty cloud in the default region.
    pub fn new() -> Self {
        Self {
            region: CloudBackend::Memory.default_region().to_string(),
            fixtures: Arc::new(RwLock::new(Fixtures::default())),
            live: Arc::new(RwLock::new(LiveResources::default())),
            counter: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            latency: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Seed a VPC.
    pub fn add_vpc(self, id: impl Into<String>, tags: &[(&str, &str)]) -> Self {
        self.fixtures.write().vpcs.push(SeededVpc {
            id: id.into(),
            tags: tagged(tags),
        });
        self
    }

    /// Seed a subnet of `vpc_id`.
    pub fn add_subnet(
        self,
        id: impl Into<String>,
        vpc_id: impl Into<String>,
        tags: &[(&str, &str)],
    ) -> Self {
        self.fixtures.write().subnets.push(SeededSubnet {
            id: id.into(),
            vpc_id: vpc_id.into(),
            tags: tagged(tags),
        });
        self
    }

    /// Seed a machine image.
    pub fn add_image(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
        creation_date: impl Into<String>,
    ) -> Self {
        self.fixtures.write().images.push(SeededImage {
            image: ImageRef {
                id: id.into(),
                name: name.into(),
                creation_date: Some(creation_date.into()),
            },
            owner: owner.into(),
        });
        self
    }

    /// Seed a certificate.
    pub fn add_certificate(
        self,
        arn: impl Into<String>,
        domain: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        self.fixtures.write().certificates.push(SeededCertificate {
            certificate: CertificateRef {
                arn: arn.into(),
                domain: domain.into(),
            },
            status: status.into(),
        });
        self
    }

    /// Make every call to `method` fail with a provision error.
    pub fn fail_on(self, method: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.write().insert(method.into(), message.into());
        self
    }

    /// Delay every call, to make concurrent scheduling observable.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write() = Some(latency);
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Captured calls to one method.
    pub fn calls_for(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Clear captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Number of resources currently alive.
    pub fn live_resource_count(&self) -> usize {
        self.live.read().count()
    }

    pub fn security_group(&self, id: &str) -> Option<SecurityGroupSpec<String>> {
        self.live.read().security_groups.get(id).cloned()
    }

    pub fn instance(&self, id: &str) -> Option<InstanceSpec<String>> {
        self.live.read().instances.get(id).cloned()
    }

    pub fn load_balancer(&self, arn: &str) -> Option<LoadBalancerSpec<String>> {
        self.live.read().load_balancers.get(arn).cloned()
    }

    pub fn target_group(&self, arn: &str) -> Option<TargetGroupSpec<String>> {
        self.live.read().target_groups.get(arn).cloned()
    }

    /// Registered (target group ARN, target id) pairs.
    pub fn attachments(&self) -> Vec<(String, String)> {
        self.live.read().attachments.iter().cloned().collect()
    }

    /// Listeners ordered by ARN.
    pub fn listeners(&self) -> Vec<(String, ListenerSpec<String>)> {
        self.live
            .read()
            .listeners
            .iter()
            .map(|(arn, spec)| (arn.clone(), spec.clone()))
            .collect()
    }

    async fn enter(&self, method: &str, target: Option<&str>) -> IacResult<()> {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            target: target.map(str::to_string),
        });

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.failures.read().get(method) {
            return Err(IacError::provision(method, message.clone()));
        }
        Ok(())
    }

    fn next_serial(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn elb_arn(&self, kind: &str, name: &str, serial: usize) -> String {
        format!(
            "arn:aws:elasticloadbalancing:{}:{}:{}/{}/{:016x}",
            self.region, SIMULATED_ACCOUNT, kind, name, serial
        )
    }

    fn check_elb_name(kind: &str, name: &str) -> IacResult<()> {
        if name.is_empty() || name.len() > MAX_ELB_NAME_LEN {
            return Err(IacError::provision(
                kind,
                format!(
                    "name '{}' must be 1-{} characters",
                    name, MAX_ELB_NAME_LEN
                ),
            ));
        }
        Ok(())
    }

    fn check_subnet(&self, resource: &str, subnet_id: &str) -> IacResult<()> {
        if self.fixtures.read().subnets.iter().any(|s| s.id == subnet_id) {
            Ok(())
        } else {
            Err(IacError::provision(
                resource,
                format!("subnet '{}' does not exist", subnet_id),
            ))
        }
    }

    fn check_vpc(&self, resource: &str, vpc_id: &str) -> IacResult<()> {
        if self.fixtures.read().vpcs.iter().any(|v| v.id == vpc_id) {
            Ok(())
        } else {
            Err(IacError::provision(
                resource,
                format!("VPC '{}' does not exist", vpc_id),
            ))
        }
    }

    fn check_security_groups(&self, resource: &str, ids: &[String]) -> IacResult<()> {
        let live = self.live.read();
        match ids.iter().find(|id| !live.security_groups.contains_key(*id)) {
            Some(missing) => Err(IacError::provision(
                resource,
                format!("security group '{}' does not exist", missing),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudApi for InMemoryCloud {
    fn backend(&self) -> CloudBackend {
        CloudBackend::Memory
    }

    async fn find_vpc(&self, query: &VpcQuery) -> IacResult<NetworkRef> {
        self.enter("find_vpc", None).await?;
        let matches: Vec<NetworkRef> = self
            .fixtures
            .read()
            .vpcs
            .iter()
            .filter(|v| tags_match(&query.tags, &v.tags))
            .map(|v| NetworkRef { id: v.id.clone() })
            .collect();
        select_single("VPC", query.to_string(), matches)
    }

    async fn find_subnets(&self, query: &SubnetQuery) -> IacResult<SubnetSet> {
        self.enter("find_subnets", Some(&query.vpc_id)).await?;
        let ids = self
            .fixtures
            .read()
            .subnets
            .iter()
            .filter(|s| s.vpc_id == query.vpc_id && tags_match(&query.tags, &s.tags))
            .map(|s| s.id.clone())
            .collect();
        Ok(SubnetSet { ids })
    }

    async fn find_image(&self, query: &ImageQuery) -> IacResult<ImageRef> {
        self.enter("find_image", Some(&query.name)).await?;
        let candidates: Vec<ImageRef> = self
            .fixtures
            .read()
            .images
            .iter()
            .filter(|i| i.image.name == query.name)
            .filter(|i| query.owners.is_empty() || query.owners.contains(&i.owner))
            .map(|i| i.image.clone())
            .collect();
        select_image(query, candidates)
    }

    async fn find_certificate(&self, query: &CertificateQuery) -> IacResult<CertificateRef> {
        self.enter("find_certificate", Some(&query.domain)).await?;
        let matches: Vec<CertificateRef> = self
            .fixtures
            .read()
            .certificates
            .iter()
            .filter(|c| c.certificate.domain == query.domain)
            .filter(|c| query.statuses.is_empty() || query.statuses.contains(&c.status))
            .map(|c| c.certificate.clone())
            .collect();
        select_single("certificate", query.to_string(), matches)
    }

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec<String>,
    ) -> IacResult<Attributes> {
        self.enter("create_security_group", Some(&spec.name)).await?;
        self.check_vpc("security group", &spec.vpc_id)?;

        let mut live = self.live.write();
        if live
            .security_groups
            .values()
            .any(|g| g.vpc_id == spec.vpc_id && g.name == spec.name)
        {
            return Err(IacError::AlreadyExists);
        }

        let id = format!("sg-{:017x}", self.next_serial());
        live.security_groups.insert(id.clone(), spec.clone());
        debug!("Created security group {} ({})", spec.name, id);

        Ok(Attributes::from([
            (attrs::ID.to_string(), id),
            (attrs::NAME.to_string(), spec.name.clone()),
        ]))
    }

    async fn delete_security_group(&self, attributes: &Attributes) -> IacResult<()> {
        let id = required_attribute(attributes, "security group", attrs::ID)?;
        self.enter("delete_security_group", Some(id)).await?;

        let mut live = self.live.write();
        let in_use = live
            .instances
            .values()
            .any(|i| i.security_group_ids.iter().any(|g| g == id))
            || live
                .load_balancers
                .values()
                .any(|lb| lb.security_groups.iter().any(|g| g == id));
        if in_use {
            return Err(IacError::DependencyViolation);
        }
        live.security_groups.remove(id);
        Ok(())
    }

    async fn create_instance(&self, spec: &InstanceSpec<String>) -> IacResult<Attributes> {
        self.enter("create_instance", Some(&spec.subnet_id)).await?;

        if spec.subnet_id.is_empty() {
            return Err(IacError::provision("instance", "no subnet given"));
        }
        self.check_subnet("instance", &spec.subnet_id)?;
        self.check_security_groups("instance", &spec.security_group_ids)?;
        if !self.fixtures.read().images.iter().any(|i| i.image.id == spec.ami) {
            return Err(IacError::provision(
                "instance",
                format!("image '{}' does not exist", spec.ami),
            ));
        }

        let serial = self.next_serial();
        let id = format!("i-{:017x}", serial);
        let (high, low) = (serial / 250, serial % 250 + 1);
        let public_ip = format!("54.0.{}.{}", high, low);
        let private_ip = format!("10.0.{}.{}", high, low);
        let public_dns = format!(
            "ec2-54-0-{}-{}.{}.compute.amazonaws.com",
            high, low, self.region
        );

        self.live.write().instances.insert(id.clone(), spec.clone());
        debug!("Launched instance {} in {}", id, spec.subnet_id);

        Ok(Attributes::from([
            (attrs::ID.to_string(), id),
            (attrs::PUBLIC_DNS.to_string(), public_dns),
            (attrs::PUBLIC_IP.to_string(), public_ip),
            (attrs::PRIVATE_IP.to_string(), private_ip),
        ]))
    }

    async fn delete_instance(&self, attributes: &Attributes) -> IacResult<()> {
        let id = required_attribute(attributes, "instance", attrs::ID)?;
        self.enter("delete_instance", Some(id)).await?;

        let mut live = self.live.write();
        live.instances.remove(id);
        live.attachments.retain(|(_, target)| target != id);
        Ok(())
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec<String>,
    ) -> IacResult<Attributes> {
        self.enter("create_load_balancer", Some(&spec.name)).await?;
        Self::check_elb_name("load balancer", &spec.name)?;
        for subnet in &spec.subnets {
            self.check_subnet("load balancer", subnet)?;
        }
        self.check_security_groups("load balancer", &spec.security_groups)?;

        let mut live = self.live.write();
        if live.load_balancers.values().any(|lb| lb.name == spec.name) {
            return Err(IacError::AlreadyExists);
        }

        let serial = self.next_serial();
        let kind = format!("loadbalancer/{}", spec.load_balancer_type.as_str());
        let arn = self.elb_arn(&kind, &spec.name, serial);
        let scheme = if spec.internal { "internal-" } else { "" };
        let dns_name = format!(
            "{}{}-{}.{}.elb.amazonaws.com",
            scheme, spec.name, serial, self.region
        );

        live.load_balancers.insert(arn.clone(), spec.clone());
        debug!("Created load balancer {} ({})", spec.name, arn);

        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
            (attrs::NAME.to_string(), spec.name.clone()),
            (attrs::DNS_NAME.to_string(), dns_name),
        ]))
    }

    async fn delete_load_balancer(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "load balancer", attrs::ARN)?;
        self.enter("delete_load_balancer", Some(arn)).await?;

        let mut live = self.live.write();
        live.load_balancers.remove(arn);
        live.listeners.retain(|_, l| l.load_balancer_arn != arn);
        Ok(())
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec<String>) -> IacResult<Attributes> {
        self.enter("create_target_group", Some(&spec.name)).await?;
        Self::check_elb_name("target group", &spec.name)?;
        self.check_vpc("target group", &spec.vpc_id)?;

        let mut live = self.live.write();
        if live.target_groups.values().any(|tg| tg.name == spec.name) {
            return Err(IacError::AlreadyExists);
        }

        let arn = self.elb_arn("targetgroup", &spec.name, self.next_serial());
        live.target_groups.insert(arn.clone(), spec.clone());

        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
            (attrs::NAME.to_string(), spec.name.clone()),
        ]))
    }

    async fn delete_target_group(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "target group", attrs::ARN)?;
        self.enter("delete_target_group", Some(arn)).await?;

        let mut live = self.live.write();
        let in_use = live.listeners.values().any(|l| {
            l.default_actions.iter().any(|a| {
                matches!(a, ListenerAction::Forward { target_group_arn } if target_group_arn == arn)
            })
        });
        if in_use {
            return Err(IacError::provision(
                "target group",
                format!("'{}' is in use by a listener", arn),
            ));
        }
        live.target_groups.remove(arn);
        live.attachments.retain(|(tg, _)| tg != arn);
        Ok(())
    }

    async fn attach_target(
        &self,
        spec: &TargetGroupAttachmentSpec<String>,
    ) -> IacResult<Attributes> {
        self.enter("attach_target", Some(&spec.target_id)).await?;

        let mut live = self.live.write();
        if !live.target_groups.contains_key(&spec.target_group_arn) {
            return Err(IacError::provision(
                "target group attachment",
                format!("target group '{}' does not exist", spec.target_group_arn),
            ));
        }
        if !live.instances.contains_key(&spec.target_id) {
            return Err(IacError::provision(
                "target group attachment",
                format!("target '{}' does not exist", spec.target_id),
            ));
        }
        live.attachments
            .insert((spec.target_group_arn.clone(), spec.target_id.clone()));

        Ok(Attributes::from([
            (
                attrs::ID.to_string(),
                format!("{}-{}", spec.target_group_arn, spec.target_id),
            ),
            (
                attrs::TARGET_GROUP_ARN.to_string(),
                spec.target_group_arn.clone(),
            ),
            (attrs::TARGET_ID.to_string(), spec.target_id.clone()),
        ]))
    }

    async fn detach_target(&self, attributes: &Attributes) -> IacResult<()> {
        let tg = required_attribute(attributes, "target group attachment", attrs::TARGET_GROUP_ARN)?;
        let target = required_attribute(attributes, "target group attachment", attrs::TARGET_ID)?;
        self.enter("detach_target", Some(target)).await?;

        self.live
            .write()
            .attachments
            .remove(&(tg.to_string(), target.to_string()));
        Ok(())
    }

    async fn create_listener(&self, spec: &ListenerSpec<String>) -> IacResult<Attributes> {
        self.enter("create_listener", Some(&spec.load_balancer_arn))
            .await?;

        if spec.protocol == ListenerProtocol::Https {
            let Some(certificate) = &spec.certificate_arn else {
                return Err(IacError::provision(
                    "listener",
                    "HTTPS listeners require a certificate",
                ));
            };
            if !self
                .fixtures
                .read()
                .certificates
                .iter()
                .any(|c| &c.certificate.arn == certificate)
            {
                return Err(IacError::provision(
                    "listener",
                    format!("certificate '{}' does not exist", certificate),
                ));
            }
        }

        let mut live = self.live.write();
        let Some(lb) = live.load_balancers.get(&spec.load_balancer_arn) else {
            return Err(IacError::provision(
                "listener",
                format!("load balancer '{}' does not exist", spec.load_balancer_arn),
            ));
        };
        let lb_name = lb.name.clone();

        for action in &spec.default_actions {
            if let ListenerAction::Forward { target_group_arn } = action {
                if !live.target_groups.contains_key(target_group_arn) {
                    return Err(IacError::provision(
                        "listener",
                        format!("target group '{}' does not exist", target_group_arn),
                    ));
                }
            }
        }
        if live
            .listeners
            .values()
            .any(|l| l.load_balancer_arn == spec.load_balancer_arn && l.port == spec.port)
        {
            return Err(IacError::AlreadyExists);
        }

        let arn = format!(
            "{}/{:016x}",
            self.elb_arn("listener/app", &lb_name, self.next_serial()),
            spec.port
        );
        live.listeners.insert(arn.clone(), spec.clone());

        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
        ]))
    }

    async fn delete_listener(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "listener", attrs::ARN)?;
        self.enter("delete_listener", Some(arn)).await?;
        self.live.write().listeners.remove(arn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{RootVolume, SecurityRule};

    fn cloud() -> InMemoryCloud {
        InMemoryCloud::new()
            .add_vpc("vpc-1", &[("Name", "custom-default-network")])
            .add_vpc("vpc-2", &[("Name", "other")])
            .add_subnet("subnet-a", "vpc-1", &[("Public", "1")])
            .add_subnet("subnet-b", "vpc-1", &[("Public", "1")])
            .add_subnet("subnet-p", "vpc-1", &[("Public", "0")])
            .add_subnet("subnet-x", "vpc-2", &[("Public", "1")])
            .add_image("ami-1", "web-app", "137130492928", "2024-01-01T00:00:00.000Z")
            .add_certificate("arn:cert", "pulumi-test.com", "ISSUED")
    }

    fn group(name: &str) -> SecurityGroupSpec<String> {
        SecurityGroupSpec {
            name: name.to_string(),
            description: "test".to_string(),
            vpc_id: "vpc-1".to_string(),
            ingress: vec![SecurityRule::tcp_from_anywhere(80)],
            egress: vec![SecurityRule::all_to_anywhere()],
            tags: Tags::new(),
        }
    }

    fn instance(sg: &str) -> InstanceSpec<String> {
        InstanceSpec {
            ami: "ami-1".to_string(),
            instance_type: "t2.micro".to_string(),
            root_volume: RootVolume {
                size_gib: 32,
                volume_type: "gp3".to_string(),
                delete_on_termination: true,
            },
            user_data: String::new(),
            key_name: "key".to_string(),
            security_group_ids: vec![sg.to_string()],
            subnet_id: "subnet-a".to_string(),
            tags: Tags::new(),
        }
    }

    #[tokio::test]
    async fn test_vpc_lookup() {
        let cloud = cloud();
        let vpc = cloud
            .find_vpc(&VpcQuery::tagged("Name", "custom-default-network"))
            .await
            .unwrap();
        assert_eq!(vpc.id, "vpc-1");

        let err = cloud
            .find_vpc(&VpcQuery::tagged("Name", "missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ambiguous_vpc_lookup() {
        let cloud = cloud().add_vpc("vpc-3", &[("Name", "custom-default-network")]);
        let err = cloud
            .find_vpc(&VpcQuery::tagged("Name", "custom-default-network"))
            .await
            .unwrap_err();
        assert!(matches!(err, IacError::Ambiguous { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_subnet_lookup_filters_by_vpc_and_tags() {
        let subnets = cloud()
            .find_subnets(&SubnetQuery {
                vpc_id: "vpc-1".to_string(),
                tags: tagged(&[("Public", "1")]),
            })
            .await
            .unwrap();
        assert_eq!(subnets.ids, vec!["subnet-a", "subnet-b"]);
    }

    #[tokio::test]
    async fn test_certificate_lookup_requires_exact_domain_and_status() {
        let cloud = cloud().add_certificate("arn:pending", "other.com", "PENDING_VALIDATION");
        let cert = cloud
            .find_certificate(&CertificateQuery::issued("pulumi-test.com"))
            .await
            .unwrap();
        assert_eq!(cert.arn, "arn:cert");

        assert!(cloud
            .find_certificate(&CertificateQuery::issued("other.com"))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(cloud
            .find_certificate(&CertificateQuery::issued("www.pulumi-test.com"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_image_lookup_respects_owner() {
        let cloud = cloud().add_image("ami-2", "web-app", "999", "2030-01-01T00:00:00.000Z");
        let image = cloud
            .find_image(&ImageQuery {
                name: "web-app".to_string(),
                owners: vec!["137130492928".to_string()],
                most_recent: true,
            })
            .await
            .unwrap();
        assert_eq!(image.id, "ami-1");
    }

    #[tokio::test]
    async fn test_security_group_in_use_cannot_be_deleted() {
        let cloud = cloud();
        let sg = cloud.create_security_group(&group("web")).await.unwrap();
        let sg_id = sg[attrs::ID].clone();
        let ec2 = cloud.create_instance(&instance(&sg_id)).await.unwrap();

        assert!(matches!(
            cloud.delete_security_group(&sg).await,
            Err(IacError::DependencyViolation)
        ));

        cloud.delete_instance(&ec2).await.unwrap();
        cloud.delete_security_group(&sg).await.unwrap();
        assert_eq!(cloud.live_resource_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_security_group_name() {
        let cloud = cloud();
        cloud.create_security_group(&group("web")).await.unwrap();
        let err = cloud.create_security_group(&group("web")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_instance_requires_existing_subnet() {
        let cloud = cloud();
        let sg = cloud.create_security_group(&group("web")).await.unwrap();
        let mut spec = instance(&sg[attrs::ID]);
        spec.subnet_id = String::new();

        let err = cloud.create_instance(&spec).await.unwrap_err();
        assert!(matches!(err, IacError::Provision { .. }));
    }

    #[tokio::test]
    async fn test_long_load_balancer_name_rejected() {
        let cloud = cloud();
        let spec = LoadBalancerSpec {
            name: "a".repeat(MAX_ELB_NAME_LEN + 1),
            internal: false,
            load_balancer_type: crate::resources::LoadBalancerType::Application,
            security_groups: vec![],
            subnets: vec!["subnet-a".to_string()],
            enable_deletion_protection: false,
            tags: Tags::new(),
        };
        assert!(cloud.create_load_balancer(&spec).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection_and_captured_calls() {
        let cloud = cloud().fail_on("create_security_group", "quota exceeded");
        let err = cloud.create_security_group(&group("web")).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        let calls = cloud.calls_for("create_security_group");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target.as_deref(), Some("web"));

        cloud.clear_calls();
        assert_eq!(cloud.call_count(), 0);
    }
}
