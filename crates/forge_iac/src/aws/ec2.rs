//! EC2 lookups, security groups and instances.

use std::time::Duration;

use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, InstanceStateName, InstanceType, IpPermission,
    IpRange, ResourceType, UserIdGroupPair, VolumeType,
};
use backon::{ExponentialBuilder, Retryable};
use forge_core::Attributes;
use tracing::{debug, info, warn};

use super::error::sdk_error;
use super::rollback::or_rollback;
use super::tags::ec2_tag_spec;
use super::AwsCloud;
use crate::error::{ignore_not_found, IacError, IacResult};
use crate::lookup::{
    select_image, select_single, ImageQuery, ImageRef, NetworkRef, SubnetQuery, SubnetSet, Tags,
    VpcQuery,
};
use crate::provider::required_attribute;
use crate::resources::{attrs, InstanceSpec, RuleSource, SecurityGroupSpec, SecurityRule};

/// Root device used when the image does not report one.
const DEFAULT_ROOT_DEVICE: &str = "/dev/xvda";

fn tag_filters(tags: &Tags) -> Vec<Filter> {
    tags.iter()
        .map(|(key, value)| {
            Filter::builder()
                .name(format!("tag:{}", key))
                .values(value)
                .build()
        })
        .collect()
}

fn ip_permission(rule: &SecurityRule, group_id: &str) -> IpPermission {
    let builder = IpPermission::builder()
        .ip_protocol(rule.protocol.as_str())
        .from_port(rule.from_port)
        .to_port(rule.to_port);

    match &rule.source {
        RuleSource::Cidr(cidr) => builder.ip_ranges(IpRange::builder().cidr_ip(cidr).build()),
        RuleSource::SelfGroup => {
            builder.user_id_group_pairs(UserIdGroupPair::builder().group_id(group_id).build())
        }
    }
    .build()
}

fn polling() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(2))
        .with_max_delay(Duration::from_secs(15))
        .with_max_times(40)
}

fn is_pending(e: &IacError) -> bool {
    matches!(e, IacError::NotReady(_)) || e.is_retryable()
}

impl AwsCloud {
    pub(super) async fn describe_vpc(&self, query: &VpcQuery) -> IacResult<NetworkRef> {
        let response = self
            .ec2
            .describe_vpcs()
            .set_filters(Some(tag_filters(&query.tags)))
            .send()
            .await
            .map_err(|e| sdk_error("DescribeVpcs", &e))?;

        let matches: Vec<NetworkRef> = response
            .vpcs()
            .iter()
            .filter_map(|v| v.vpc_id())
            .map(|id| NetworkRef { id: id.to_string() })
            .collect();
        select_single("VPC", query.to_string(), matches)
    }

    pub(super) async fn describe_subnets(&self, query: &SubnetQuery) -> IacResult<SubnetSet> {
        let mut filters = vec![Filter::builder()
            .name("vpc-id")
            .values(&query.vpc_id)
            .build()];
        filters.extend(tag_filters(&query.tags));

        let mut ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let response = self
                .ec2
                .describe_subnets()
                .set_filters(Some(filters.clone()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("DescribeSubnets", &e))?;

            ids.extend(
                response
                    .subnets()
                    .iter()
                    .filter_map(|s| s.subnet_id())
                    .map(str::to_string),
            );
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(vpc_id = %query.vpc_id, count = ids.len(), "Found subnets");
        Ok(SubnetSet { ids })
    }

    pub(super) async fn describe_image(&self, query: &ImageQuery) -> IacResult<ImageRef> {
        let response = self
            .ec2
            .describe_images()
            .set_owners(Some(query.owners.clone()))
            .filters(Filter::builder().name("name").values(&query.name).build())
            .send()
            .await
            .map_err(|e| sdk_error("DescribeImages", &e))?;

        let candidates: Vec<ImageRef> = response
            .images()
            .iter()
            .filter_map(|image| {
                Some(ImageRef {
                    id: image.image_id()?.to_string(),
                    name: image.name().unwrap_or(&query.name).to_string(),
                    creation_date: image.creation_date().map(str::to_string),
                })
            })
            .collect();
        select_image(query, candidates)
    }

    async fn root_device_name(&self, image_id: &str) -> IacResult<String> {
        let response = self
            .ec2
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeImages", &e))?;

        Ok(response
            .images()
            .first()
            .and_then(|i| i.root_device_name())
            .unwrap_or(DEFAULT_ROOT_DEVICE)
            .to_string())
    }

    pub(super) async fn create_group(&self, spec: &SecurityGroupSpec<String>) -> IacResult<Attributes> {
        info!(name = %spec.name, vpc_id = %spec.vpc_id, "Creating security group");

        let response = self
            .ec2
            .create_security_group()
            .group_name(&spec.name)
            .description(&spec.description)
            .vpc_id(&spec.vpc_id)
            .set_tag_specifications(
                ec2_tag_spec(ResourceType::SecurityGroup, &spec.tags).map(|t| vec![t]),
            )
            .send()
            .await
            .map_err(|e| sdk_error("CreateSecurityGroup", &e))?;

        let group_id = response
            .group_id()
            .ok_or_else(|| IacError::missing("security group", "GroupId"))?
            .to_string();

        let authorized = self.authorize_rules(spec, &group_id).await;
        let cleanup = Attributes::from([(attrs::ID.to_string(), group_id.clone())]);
        or_rollback("security group", &group_id, authorized, || self.delete_group(&cleanup)).await?;

        info!(group_id = %group_id, "Security group created");
        Ok(Attributes::from([
            (attrs::ID.to_string(), group_id),
            (attrs::NAME.to_string(), spec.name.clone()),
        ]))
    }

    async fn authorize_rules(&self, spec: &SecurityGroupSpec<String>, group_id: &str) -> IacResult<()> {
        if !spec.ingress.is_empty() {
            self.ec2
                .authorize_security_group_ingress()
                .group_id(group_id)
                .set_ip_permissions(Some(
                    spec.ingress
                        .iter()
                        .map(|r| ip_permission(r, group_id))
                        .collect(),
                ))
                .send()
                .await
                .map_err(|e| sdk_error("AuthorizeSecurityGroupIngress", &e))?;
        }

        // New groups already allow all outbound traffic; that rule comes back as a duplicate.
        for rule in &spec.egress {
            let result = self
                .ec2
                .authorize_security_group_egress()
                .group_id(group_id)
                .ip_permissions(ip_permission(rule, group_id))
                .send()
                .await
                .map_err(|e| sdk_error("AuthorizeSecurityGroupEgress", &e));
            match result {
                Ok(_) => {}
                Err(e) if e.is_already_exists() => debug!(group_id = %group_id, "Egress rule already present"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Delete a security group, retrying while network interfaces are still releasing.
    pub(super) async fn delete_group(&self, attributes: &Attributes) -> IacResult<()> {
        let group_id = required_attribute(attributes, "security group", attrs::ID)?;
        info!(group_id = %group_id, "Deleting security group");

        (|| async {
            let result = self
                .ec2
                .delete_security_group()
                .group_id(group_id)
                .send()
                .await
                .map_err(|e| sdk_error("DeleteSecurityGroup", &e));
            match ignore_not_found(result)? {
                Some(_) => info!(group_id = %group_id, "Security group deleted"),
                None => debug!(group_id = %group_id, "Security group already deleted"),
            }
            Ok(())
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(60))
                .with_max_times(5),
        )
        .when(|e: &IacError| e.is_retryable())
        .notify(|e: &IacError, dur: Duration| {
            warn!(
                group_id = %group_id,
                delay = ?dur,
                error = %e,
                "Security group deletion failed, retrying..."
            );
        })
        .await
    }

    pub(super) async fn launch_instance(&self, spec: &InstanceSpec<String>) -> IacResult<Attributes> {
        let root_device = self.root_device_name(&spec.ami).await?;
        let user_data = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            spec.user_data.as_bytes(),
        );

        info!(
            instance_type = %spec.instance_type,
            ami = %spec.ami,
            subnet_id = %spec.subnet_id,
            "Launching instance"
        );

        let response = self
            .ec2
            .run_instances()
            .image_id(&spec.ami)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .key_name(&spec.key_name)
            .subnet_id(&spec.subnet_id)
            .set_security_group_ids(Some(spec.security_group_ids.clone()))
            .user_data(user_data)
            .block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name(root_device)
                    .ebs(
                        EbsBlockDevice::builder()
                            .volume_size(spec.root_volume.size_gib)
                            .volume_type(VolumeType::from(spec.root_volume.volume_type.as_str()))
                            .delete_on_termination(spec.root_volume.delete_on_termination)
                            .build(),
                    )
                    .build(),
            )
            .set_tag_specifications(
                ec2_tag_spec(ResourceType::Instance, &spec.tags).map(|t| vec![t]),
            )
            .send()
            .await
            .map_err(|e| sdk_error("RunInstances", &e))?;

        let instance_id = response
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .ok_or_else(|| IacError::missing("instance", "InstanceId"))?
            .to_string();

        info!(instance_id = %instance_id, "Instance launched, waiting for it to run");

        let running = (|| async { self.running_instance(&instance_id).await })
            .retry(polling())
            .when(is_pending)
            .notify(|e: &IacError, dur: Duration| {
                debug!(instance_id = %instance_id, delay = ?dur, error = %e, "Instance not running yet");
            })
            .await;
        let cleanup = Attributes::from([(attrs::ID.to_string(), instance_id.clone())]);
        let mut attributes =
            or_rollback("instance", &instance_id, running, || self.terminate_instance(&cleanup))
                .await?;
        attributes.insert(attrs::ID.to_string(), instance_id);
        Ok(attributes)
    }

    async fn running_instance(&self, instance_id: &str) -> IacResult<Attributes> {
        let response = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeInstances", &e))?;

        let instance = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .ok_or_else(|| IacError::NotReady(instance_id.to_string()))?;

        match instance.state().and_then(|s| s.name()) {
            Some(InstanceStateName::Running) => {}
            Some(InstanceStateName::Pending) | None => {
                return Err(IacError::NotReady(instance_id.to_string()))
            }
            Some(other) => {
                return Err(IacError::provision(
                    "instance",
                    format!("{} entered state {}", instance_id, other.as_str()),
                ))
            }
        }

        let mut attributes = Attributes::new();
        for (key, value) in [
            (attrs::PUBLIC_DNS, instance.public_dns_name()),
            (attrs::PUBLIC_IP, instance.public_ip_address()),
            (attrs::PRIVATE_IP, instance.private_ip_address()),
        ] {
            attributes.insert(key.to_string(), value.unwrap_or_default().to_string());
        }
        Ok(attributes)
    }

    /// Terminate an instance and wait until it is gone.
    pub(super) async fn terminate_instance(&self, attributes: &Attributes) -> IacResult<()> {
        let instance_id = required_attribute(attributes, "instance", attrs::ID)?;
        info!(instance_id = %instance_id, "Terminating instance");

        let result = self
            .ec2
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| sdk_error("TerminateInstances", &e));
        if ignore_not_found(result)?.is_none() {
            debug!(instance_id = %instance_id, "Instance already terminated");
            return Ok(());
        }

        (|| async {
            let response = self
                .ec2
                .describe_instances()
                .instance_ids(instance_id)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeInstances", &e));
            let Some(response) = ignore_not_found(response)? else {
                return Ok(());
            };
            let terminated = response
                .reservations()
                .iter()
                .flat_map(|r| r.instances())
                .all(|i| {
                    matches!(
                        i.state().and_then(|s| s.name()),
                        Some(InstanceStateName::Terminated)
                    )
                });
            if terminated {
                Ok(())
            } else {
                Err(IacError::NotReady(instance_id.to_string()))
            }
        })
        .retry(polling())
        .when(is_pending)
        .await?;

        info!(instance_id = %instance_id, "Instance terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_rule_references_the_group() {
        let permission = ip_permission(&SecurityRule::all_from_self(), "sg-123");
        assert_eq!(permission.ip_protocol(), Some("-1"));
        assert_eq!(
            permission.user_id_group_pairs()[0].group_id(),
            Some("sg-123")
        );
        assert!(permission.ip_ranges().is_empty());
    }

    #[test]
    fn cidr_rule_uses_ip_range() {
        let permission = ip_permission(&SecurityRule::tcp_from_anywhere(443), "sg-123");
        assert_eq!(permission.from_port(), Some(443));
        assert_eq!(permission.ip_ranges()[0].cidr_ip(), Some("0.0.0.0/0"));
    }

    #[test]
    fn tag_filters_prefix_keys() {
        let filters = tag_filters(&Tags::from([("Public".to_string(), "1".to_string())]));
        assert_eq!(filters[0].name(), Some("tag:Public"));
        assert_eq!(filters[0].values(), &["1".to_string()]);
    }
}
