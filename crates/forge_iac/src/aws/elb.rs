//! Application load balancers, target groups and listeners.

use std::time::Duration;

use aws_sdk_elasticloadbalancingv2::error::BuildError;
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, Certificate, LoadBalancerAttribute, LoadBalancerSchemeEnum,
    LoadBalancerStateEnum, LoadBalancerTypeEnum, ProtocolEnum, RedirectActionConfig,
    RedirectActionStatusCodeEnum, TargetDescription, TargetTypeEnum,
};
use backon::{ExponentialBuilder, Retryable};
use forge_core::Attributes;
use tracing::{debug, info};

use super::error::sdk_error;
use super::rollback::or_rollback;
use super::tags::elb_tags;
use super::AwsCloud;
use crate::error::{ignore_not_found, IacError, IacResult};
use crate::provider::required_attribute;
use crate::resources::{
    attrs, ListenerAction, ListenerSpec, LoadBalancerSpec, TargetGroupAttachmentSpec,
    TargetGroupSpec,
};

fn build_error(resource: &'static str) -> impl Fn(BuildError) -> IacError {
    move |e| IacError::provision(resource, e.to_string())
}

fn elb_action(action: &ListenerAction<String>) -> IacResult<Action> {
    match action {
        ListenerAction::Redirect {
            protocol,
            port,
            status_code,
        } => {
            let redirect = RedirectActionConfig::builder()
                .protocol(protocol.as_str())
                .port(port)
                .status_code(RedirectActionStatusCodeEnum::from(status_code.as_str()))
                .build()
                .map_err(build_error("listener"))?;
            Action::builder()
                .r#type(ActionTypeEnum::Redirect)
                .redirect_config(redirect)
                .build()
                .map_err(build_error("listener"))
        }
        ListenerAction::Forward { target_group_arn } => Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn(target_group_arn)
            .build()
            .map_err(build_error("listener")),
    }
}

impl AwsCloud {
    pub(super) async fn create_alb(&self, spec: &LoadBalancerSpec<String>) -> IacResult<Attributes> {
        info!(name = %spec.name, subnets = spec.subnets.len(), "Creating load balancer");

        let scheme = if spec.internal {
            LoadBalancerSchemeEnum::Internal
        } else {
            LoadBalancerSchemeEnum::InternetFacing
        };

        let response = self
            .elb
            .create_load_balancer()
            .name(&spec.name)
            .r#type(LoadBalancerTypeEnum::from(spec.load_balancer_type.as_str()))
            .scheme(scheme)
            .set_subnets(Some(spec.subnets.clone()))
            .set_security_groups(Some(spec.security_groups.clone()))
            .set_tags(Some(elb_tags(&spec.tags)?))
            .send()
            .await
            .map_err(|e| sdk_error("CreateLoadBalancer", &e))?;

        let lb = response
            .load_balancers()
            .first()
            .ok_or_else(|| IacError::missing("load balancer", "LoadBalancers"))?;
        let arn = lb
            .load_balancer_arn()
            .ok_or_else(|| IacError::missing("load balancer", "LoadBalancerArn"))?
            .to_string();
        let dns_name = lb.dns_name().unwrap_or_default().to_string();

        let ready = self.finish_alb(spec, &arn).await;
        let cleanup = Attributes::from([(attrs::ARN.to_string(), arn.clone())]);
        or_rollback("load balancer", &arn, ready, || self.delete_alb(&cleanup)).await?;

        info!(arn = %arn, dns_name = %dns_name, "Load balancer active");
        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
            (attrs::NAME.to_string(), spec.name.clone()),
            (attrs::DNS_NAME.to_string(), dns_name),
        ]))
    }

    /// Apply attributes and wait until the load balancer is active.
    async fn finish_alb(&self, spec: &LoadBalancerSpec<String>, arn: &str) -> IacResult<()> {
        if spec.enable_deletion_protection {
            self.elb
                .modify_load_balancer_attributes()
                .load_balancer_arn(arn)
                .attributes(
                    LoadBalancerAttribute::builder()
                        .key("deletion_protection.enabled")
                        .value("true")
                        .build(),
                )
                .send()
                .await
                .map_err(|e| sdk_error("ModifyLoadBalancerAttributes", &e))?;
        }

        (|| async { self.load_balancer_active(arn).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(5))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(30),
            )
            .when(|e: &IacError| matches!(e, IacError::NotReady(_)) || e.is_retryable())
            .notify(|_: &IacError, dur: Duration| {
                debug!(arn = %arn, delay = ?dur, "Load balancer still provisioning");
            })
            .await
    }

    async fn load_balancer_active(&self, arn: &str) -> IacResult<()> {
        let response = self
            .elb
            .describe_load_balancers()
            .load_balancer_arns(arn)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeLoadBalancers", &e))?;

        let state = response
            .load_balancers()
            .first()
            .and_then(|lb| lb.state())
            .and_then(|s| s.code());
        match state {
            Some(LoadBalancerStateEnum::Active) => Ok(()),
            Some(LoadBalancerStateEnum::Failed) => Err(IacError::provision(
                "load balancer",
                format!("{} failed to provision", arn),
            )),
            _ => Err(IacError::NotReady(arn.to_string())),
        }
    }

    pub(super) async fn delete_alb(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "load balancer", attrs::ARN)?;
        info!(arn = %arn, "Deleting load balancer");

        let result = self
            .elb
            .delete_load_balancer()
            .load_balancer_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteLoadBalancer", &e));
        ignore_not_found(result)?;
        Ok(())
    }

    pub(super) async fn create_tg(&self, spec: &TargetGroupSpec<String>) -> IacResult<Attributes> {
        info!(name = %spec.name, port = spec.port, "Creating target group");

        let response = self
            .elb
            .create_target_group()
            .name(&spec.name)
            .port(spec.port)
            .protocol(ProtocolEnum::from(spec.protocol.as_str()))
            .target_type(TargetTypeEnum::from(spec.target_type.as_str()))
            .vpc_id(&spec.vpc_id)
            .set_tags(Some(elb_tags(&spec.tags)?))
            .send()
            .await
            .map_err(|e| sdk_error("CreateTargetGroup", &e))?;

        let arn = response
            .target_groups()
            .first()
            .and_then(|tg| tg.target_group_arn())
            .ok_or_else(|| IacError::missing("target group", "TargetGroupArn"))?
            .to_string();

        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
            (attrs::NAME.to_string(), spec.name.clone()),
        ]))
    }

    pub(super) async fn delete_tg(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "target group", attrs::ARN)?;
        info!(arn = %arn, "Deleting target group");

        let result = self
            .elb
            .delete_target_group()
            .target_group_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteTargetGroup", &e));
        ignore_not_found(result)?;
        Ok(())
    }

    pub(super) async fn register_target(
        &self,
        spec: &TargetGroupAttachmentSpec<String>,
    ) -> IacResult<Attributes> {
        debug!(target = %spec.target_id, target_group = %spec.target_group_arn, "Registering target");

        let target = TargetDescription::builder()
            .id(&spec.target_id)
            .build()
            .map_err(build_error("target group attachment"))?;
        self.elb
            .register_targets()
            .target_group_arn(&spec.target_group_arn)
            .targets(target)
            .send()
            .await
            .map_err(|e| sdk_error("RegisterTargets", &e))?;

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

    pub(super) async fn deregister_target(&self, attributes: &Attributes) -> IacResult<()> {
        let tg = required_attribute(attributes, "target group attachment", attrs::TARGET_GROUP_ARN)?;
        let target_id = required_attribute(attributes, "target group attachment", attrs::TARGET_ID)?;
        debug!(target = %target_id, target_group = %tg, "Deregistering target");

        let target = TargetDescription::builder()
            .id(target_id)
            .build()
            .map_err(build_error("target group attachment"))?;
        let result = self
            .elb
            .deregister_targets()
            .target_group_arn(tg)
            .targets(target)
            .send()
            .await
            .map_err(|e| sdk_error("DeregisterTargets", &e));
        ignore_not_found(result)?;
        Ok(())
    }

    pub(super) async fn create_elb_listener(&self, spec: &ListenerSpec<String>) -> IacResult<Attributes> {
        info!(port = spec.port, protocol = %spec.protocol, "Creating listener");

        let mut request = self
            .elb
            .create_listener()
            .load_balancer_arn(&spec.load_balancer_arn)
            .port(spec.port)
            .protocol(ProtocolEnum::from(spec.protocol.as_str()));

        if let Some(policy) = &spec.ssl_policy {
            request = request.ssl_policy(policy);
        }
        if let Some(certificate) = &spec.certificate_arn {
            request = request.certificates(Certificate::builder().certificate_arn(certificate).build());
        }
        for action in &spec.default_actions {
            request = request.default_actions(elb_action(action)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| sdk_error("CreateListener", &e))?;

        let arn = response
            .listeners()
            .first()
            .and_then(|l| l.listener_arn())
            .ok_or_else(|| IacError::missing("listener", "ListenerArn"))?
            .to_string();

        Ok(Attributes::from([
            (attrs::ID.to_string(), arn.clone()),
            (attrs::ARN.to_string(), arn),
        ]))
    }

    pub(super) async fn delete_elb_listener(&self, attributes: &Attributes) -> IacResult<()> {
        let arn = required_attribute(attributes, "listener", attrs::ARN)?;
        info!(arn = %arn, "Deleting listener");

        let result = self
            .elb
            .delete_listener()
            .listener_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteListener", &e));
        ignore_not_found(result)?;
        Ok(())
    }
}
