//! Declarators: turn resolved lookups into the resource graph.
//!
//! Edges come from two places. Output references (the instance consuming
//! the security group id, listeners consuming the load balancer ARN) are
//! implicit. The target group waits for the load balancer, and the
//! attachment and both listeners wait for the target group, through
//! explicit `depends_on` edges.

use forge_core::{ResourceGraph, ResourceHandle, ResourceOptions};
use forge_iac::{
    InstanceSpec, ListenerAction, ListenerProtocol, ListenerSpec, LoadBalancerSpec,
    LoadBalancerType, RedirectStatus, ResourceSpec, RootVolume, SecurityGroupSpec, SecurityRule,
    Tags, TargetGroupAttachmentSpec, TargetGroupSpec, TargetType,
};

use crate::config::StackConfig;
use crate::defaults::{
    names, HTTPS_PORT, HTTP_PORT, INSTANCE_TYPE, KEY_NAME, PROVENANCE_TAG, ROOT_VOLUME_SIZE_GIB,
    ROOT_VOLUME_TYPE, SECURITY_GROUP_DESCRIPTION, SSH_PORT, TLS_POLICY, USER_DATA,
};
use crate::error::{TopologyError, TopologyResult};
use crate::lookup::ResolvedLookups;

/// Handles of the declared resources.
#[derive(Debug, Clone)]
pub struct TopologyHandles {
    pub security_group: ResourceHandle,
    pub instance: ResourceHandle,
    pub load_balancer: ResourceHandle,
    pub target_group: ResourceHandle,
    pub attachment: ResourceHandle,
    pub http_listener: ResourceHandle,
    pub https_listener: ResourceHandle,
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Tags shared by the load balancer and the target group.
fn balancing_tags(config: &StackConfig) -> Tags {
    tags(&[
        ("Project", config.project.as_str()),
        ("Environment", config.environment.as_str()),
        PROVENANCE_TAG,
    ])
}

/// Security group rules: SSH, HTTP and HTTPS from anywhere, everything from
/// group members; everything outbound.
pub fn security_group_spec(config: &StackConfig, lookups: &ResolvedLookups) -> SecurityGroupSpec {
    SecurityGroupSpec {
        name: config.resource_name(),
        description: SECURITY_GROUP_DESCRIPTION.to_string(),
        vpc_id: lookups.network.id.clone().into(),
        ingress: vec![
            SecurityRule::tcp_from_anywhere(SSH_PORT),
            SecurityRule::tcp_from_anywhere(HTTP_PORT),
            SecurityRule::tcp_from_anywhere(HTTPS_PORT),
            SecurityRule::all_from_self(),
        ],
        egress: vec![SecurityRule::all_to_anywhere()],
        tags: tags(&[("Environment", config.environment.as_str()), PROVENANCE_TAG]),
    }
}

pub fn declare_security_group(
    graph: &mut ResourceGraph<ResourceSpec>,
    config: &StackConfig,
    lookups: &ResolvedLookups,
) -> TopologyResult<ResourceHandle> {
    let spec = security_group_spec(config, lookups);
    Ok(graph.declare(
        names::SECURITY_GROUP,
        ResourceSpec::SecurityGroup(spec),
        ResourceOptions::new(),
    )?)
}

/// Declare the instance in the first public subnet.
///
/// Fails when no public subnet was found, before anything is created.
pub fn declare_instance(
    graph: &mut ResourceGraph<ResourceSpec>,
    config: &StackConfig,
    lookups: &ResolvedLookups,
    security_group: &ResourceHandle,
) -> TopologyResult<ResourceHandle> {
    let subnet_id = lookups
        .subnets
        .first()
        .ok_or_else(|| TopologyError::InvalidDeclaration {
            resource: names::INSTANCE.to_string(),
            message: format!("no public subnet in {}", lookups.network.id),
        })?;

    let spec = InstanceSpec {
        ami: lookups.image.id.clone().into(),
        instance_type: INSTANCE_TYPE.to_string(),
        root_volume: RootVolume {
            size_gib: ROOT_VOLUME_SIZE_GIB,
            volume_type: ROOT_VOLUME_TYPE.to_string(),
            delete_on_termination: true,
        },
        user_data: USER_DATA.to_string(),
        key_name: KEY_NAME.to_string(),
        security_group_ids: vec![security_group.id().into()],
        subnet_id: subnet_id.into(),
        tags: tags(&[
            ("Name", config.instance_name().as_str()),
            ("Environment", config.environment.as_str()),
            PROVENANCE_TAG,
        ]),
    };

    Ok(graph.declare(
        names::INSTANCE,
        ResourceSpec::Instance(spec),
        ResourceOptions::new(),
    )?)
}

/// Handles returned by [`declare_load_balancing`].
#[derive(Debug, Clone)]
pub struct BalancingHandles {
    pub load_balancer: ResourceHandle,
    pub target_group: ResourceHandle,
    pub attachment: ResourceHandle,
    pub http_listener: ResourceHandle,
    pub https_listener: ResourceHandle,
}

pub fn declare_load_balancing(
    graph: &mut ResourceGraph<ResourceSpec>,
    config: &StackConfig,
    lookups: &ResolvedLookups,
    security_group: &ResourceHandle,
    instance: &ResourceHandle,
) -> TopologyResult<BalancingHandles> {
    let load_balancer = graph.declare(
        names::LOAD_BALANCER,
        ResourceSpec::LoadBalancer(LoadBalancerSpec {
            name: config.resource_name(),
            internal: false,
            load_balancer_type: LoadBalancerType::Application,
            security_groups: vec![security_group.id().into()],
            subnets: lookups.subnets.ids.iter().map(|s| s.as_str().into()).collect(),
            enable_deletion_protection: false,
            tags: balancing_tags(config),
        }),
        ResourceOptions::new(),
    )?;

    let target_group = graph.declare(
        names::TARGET_GROUP,
        ResourceSpec::TargetGroup(TargetGroupSpec {
            name: config.resource_name(),
            port: HTTP_PORT,
            protocol: ListenerProtocol::Http,
            target_type: TargetType::Instance,
            vpc_id: lookups.network.id.clone().into(),
            tags: balancing_tags(config),
        }),
        ResourceOptions::new().depends_on(&load_balancer),
    )?;

    let attachment = graph.declare(
        names::ATTACHMENT,
        ResourceSpec::TargetGroupAttachment(TargetGroupAttachmentSpec {
            target_group_arn: target_group.arn().into(),
            target_id: instance.id().into(),
        }),
        ResourceOptions::new().depends_on(&target_group),
    )?;

    let http_listener = graph.declare(
        names::HTTP_LISTENER,
        ResourceSpec::Listener(ListenerSpec {
            load_balancer_arn: load_balancer.arn().into(),
            port: HTTP_PORT,
            protocol: ListenerProtocol::Http,
            ssl_policy: None,
            certificate_arn: None,
            default_actions: vec![ListenerAction::Redirect {
                protocol: ListenerProtocol::Https,
                port: HTTPS_PORT.to_string(),
                status_code: RedirectStatus::Permanent,
            }],
        }),
        ResourceOptions::new().depends_on(&target_group),
    )?;

    let https_listener = graph.declare(
        names::HTTPS_LISTENER,
        ResourceSpec::Listener(ListenerSpec {
            load_balancer_arn: load_balancer.arn().into(),
            port: HTTPS_PORT,
            protocol: ListenerProtocol::Https,
            ssl_policy: Some(TLS_POLICY.to_string()),
            certificate_arn: Some(lookups.certificate.arn.clone().into()),
            default_actions: vec![ListenerAction::Forward {
                target_group_arn: target_group.arn().into(),
            }],
        }),
        ResourceOptions::new().depends_on(&target_group),
    )?;

    Ok(BalancingHandles {
        load_balancer,
        target_group,
        attachment,
        http_listener,
        https_listener,
    })
}

/// Declare the whole topology.
pub fn declare_topology(
    config: &StackConfig,
    lookups: &ResolvedLookups,
) -> TopologyResult<(ResourceGraph<ResourceSpec>, TopologyHandles)> {
    let mut graph = ResourceGraph::new();

    let security_group = declare_security_group(&mut graph, config, lookups)?;
    let instance = declare_instance(&mut graph, config, lookups, &security_group)?;
    let balancing = declare_load_balancing(&mut graph, config, lookups, &security_group, &instance)?;

    let handles = TopologyHandles {
        security_group,
        instance,
        load_balancer: balancing.load_balancer,
        target_group: balancing.target_group,
        attachment: balancing.attachment,
        http_listener: balancing.http_listener,
        https_listener: balancing.https_listener,
    };
    Ok((graph, handles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use forge_core::{Declaration, Input};
    use forge_iac::{
        attrs, CertificateRef, ImageRef, NetworkRef, RuleProtocol, RuleSource, SubnetSet, ANYWHERE,
    };

    fn config(project: &str, environment: &str) -> StackConfig {
        StackConfig::resolve(&ConfigSource::new().with("project", project), environment).unwrap()
    }

    fn lookups(subnets: &[&str]) -> ResolvedLookups {
        ResolvedLookups {
            network: NetworkRef {
                id: "vpc-1".to_string(),
            },
            subnets: SubnetSet {
                ids: subnets.iter().map(|s| s.to_string()).collect(),
            },
            image: ImageRef {
                id: "ami-1".to_string(),
                name: "web-app".to_string(),
                creation_date: None,
            },
            certificate: CertificateRef {
                arn: "arn:cert".to_string(),
                domain: "pulumi-test.com".to_string(),
            },
        }
    }

    fn spec<'a>(graph: &'a ResourceGraph<ResourceSpec>, name: &str) -> &'a ResourceSpec {
        &graph.get(name).unwrap().declaration
    }

    #[test]
    fn test_security_group_rules() {
        for (project, env) in [("web-app", "prod"), ("x", "y"), ("api2", "staging")] {
            let sg = security_group_spec(&config(project, env), &lookups(&["subnet-a"]));
            assert_eq!(sg.name, format!("{project}-{env}"));
            assert_eq!(sg.ingress.len(), 4);
            assert_eq!(sg.egress.len(), 1);

            let tcp_ports: Vec<i32> = sg
                .ingress
                .iter()
                .filter(|r| r.protocol == RuleProtocol::Tcp)
                .map(|r| r.from_port)
                .collect();
            assert_eq!(tcp_ports, vec![22, 80, 443]);
            assert!(sg
                .ingress
                .iter()
                .any(|r| r.protocol == RuleProtocol::All && r.source == RuleSource::SelfGroup));
            assert_eq!(sg.egress[0].protocol, RuleProtocol::All);
            assert_eq!(sg.egress[0].source, RuleSource::Cidr(ANYWHERE.to_string()));
            assert_eq!(sg.tags["Environment"], env);
            assert_eq!(sg.tags["Pulumi"], "true");
        }
    }

    #[test]
    fn test_web_app_prod_names() {
        let (graph, _) = declare_topology(&config("web-app", "prod"), &lookups(&["subnet-a", "subnet-b"]))
            .unwrap();

        let ResourceSpec::Instance(instance) = spec(&graph, names::INSTANCE) else {
            panic!("expected an instance");
        };
        assert_eq!(instance.tags["Name"], "web-app-ec2-prod");
        assert_eq!(instance.subnet_id, Input::from("subnet-a"));
        assert_eq!(instance.instance_type, "t2.micro");
        assert_eq!(instance.root_volume.size_gib, 32);
        assert_eq!(instance.root_volume.volume_type, "gp3");
        assert!(instance.root_volume.delete_on_termination);
        assert_eq!(instance.user_data, "#!/bin/bash\ndocker swarm init");
        assert_eq!(instance.key_name, "pulumi-test");

        let ResourceSpec::LoadBalancer(alb) = spec(&graph, names::LOAD_BALANCER) else {
            panic!("expected a load balancer");
        };
        assert_eq!(alb.name, "web-app-prod");
        assert!(!alb.internal);
        assert_eq!(alb.subnets.len(), 2);
        assert_eq!(alb.tags["Project"], "web-app");

        let ResourceSpec::TargetGroup(tg) = spec(&graph, names::TARGET_GROUP) else {
            panic!("expected a target group");
        };
        assert_eq!(tg.name, "web-app-prod");
        assert_eq!(tg.port, 80);
        assert_eq!(tg.target_type, TargetType::Instance);
    }

    #[test]
    fn test_listener_actions() {
        let (graph, handles) =
            declare_topology(&config("web-app", "prod"), &lookups(&["subnet-a"])).unwrap();

        let ResourceSpec::Listener(http) = spec(&graph, names::HTTP_LISTENER) else {
            panic!("expected a listener");
        };
        assert_eq!(http.port, 80);
        assert_eq!(
            http.default_actions,
            vec![ListenerAction::<Input>::Redirect {
                protocol: ListenerProtocol::Https,
                port: "443".to_string(),
                status_code: RedirectStatus::Permanent,
            }]
        );

        let ResourceSpec::Listener(https) = spec(&graph, names::HTTPS_LISTENER) else {
            panic!("expected a listener");
        };
        assert_eq!(https.ssl_policy.as_deref(), Some("ELBSecurityPolicy-2016-08"));
        assert_eq!(https.certificate_arn, Some(Input::from("arn:cert")));
        assert_eq!(
            https.default_actions,
            vec![ListenerAction::<Input>::Forward {
                target_group_arn: handles.target_group.output(attrs::ARN).into(),
            }]
        );
    }

    #[test]
    fn test_dependency_edges() {
        let (graph, _) =
            declare_topology(&config("web-app", "prod"), &lookups(&["subnet-a"])).unwrap();

        assert_eq!(graph.dependencies_of(names::TARGET_GROUP), vec![names::LOAD_BALANCER]);
        for dependent in [names::ATTACHMENT, names::HTTP_LISTENER, names::HTTPS_LISTENER] {
            assert!(graph
                .dependencies_of(dependent)
                .contains(&names::TARGET_GROUP));
        }
        assert!(graph.depends_on_transitively(names::ATTACHMENT, names::INSTANCE));
        assert!(graph.depends_on_transitively(names::INSTANCE, names::SECURITY_GROUP));

        let order = graph.topological_order().unwrap();
        assert_eq!(order.first(), Some(&names::SECURITY_GROUP));
        assert_eq!(graph.len(), 7);
        assert_eq!(spec(&graph, names::ATTACHMENT).kind(), "target_group_attachment");
    }

    #[test]
    fn test_empty_subnets_fail_instance_declaration() {
        let err = declare_topology(&config("web-app", "prod"), &lookups(&[])).unwrap_err();
        match err {
            TopologyError::InvalidDeclaration { resource, .. } => {
                assert_eq!(resource, names::INSTANCE)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
