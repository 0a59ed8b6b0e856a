//! End-to-end runs of the topology against the in-memory cloud.

use std::sync::Arc;

use async_trait::async_trait;
use forge_core::{sequence_of, Attributes, EventKind, ExecutionState};
use forge_iac::{
    CertificateQuery, CertificateRef, CloudApi, CloudBackend, IacResult, ImageQuery, ImageRef,
    InMemoryCloud, InstanceSpec, ListenerAction, ListenerProtocol, ListenerSpec, LoadBalancerSpec,
    NetworkRef, RedirectStatus, SecurityGroupSpec, SubnetQuery, SubnetSet,
    TargetGroupAttachmentSpec, TargetGroupSpec, VpcQuery,
};
use forge_topology::defaults::{names, CERTIFICATE_DOMAIN, IMAGE_OWNER, VPC_NAME};
use forge_topology::{ConfigSource, StackOutputs, TopologyBuilder, TopologyError};
use mockall::mock;
use tempfile::tempdir;

mock! {
    pub Cloud {}

    #[async_trait]
    impl CloudApi for Cloud {
        fn backend(&self) -> CloudBackend;
        async fn find_vpc(&self, query: &VpcQuery) -> IacResult<NetworkRef>;
        async fn find_subnets(&self, query: &SubnetQuery) -> IacResult<SubnetSet>;
        async fn find_image(&self, query: &ImageQuery) -> IacResult<ImageRef>;
        async fn find_certificate(&self, query: &CertificateQuery) -> IacResult<CertificateRef>;
        async fn create_security_group(&self, spec: &SecurityGroupSpec<String>) -> IacResult<Attributes>;
        async fn delete_security_group(&self, attributes: &Attributes) -> IacResult<()>;
        async fn create_instance(&self, spec: &InstanceSpec<String>) -> IacResult<Attributes>;
        async fn delete_instance(&self, attributes: &Attributes) -> IacResult<()>;
        async fn create_load_balancer(&self, spec: &LoadBalancerSpec<String>) -> IacResult<Attributes>;
        async fn delete_load_balancer(&self, attributes: &Attributes) -> IacResult<()>;
        async fn create_target_group(&self, spec: &TargetGroupSpec<String>) -> IacResult<Attributes>;
        async fn delete_target_group(&self, attributes: &Attributes) -> IacResult<()>;
        async fn attach_target(&self, spec: &TargetGroupAttachmentSpec<String>) -> IacResult<Attributes>;
        async fn detach_target(&self, attributes: &Attributes) -> IacResult<()>;
        async fn create_listener(&self, spec: &ListenerSpec<String>) -> IacResult<Attributes>;
        async fn delete_listener(&self, attributes: &Attributes) -> IacResult<()>;
    }
}

const CERTIFICATE_ARN: &str = "arn:aws:acm:us-east-1:000000000000:certificate/web";

fn seeded_cloud() -> InMemoryCloud {
    InMemoryCloud::new()
        .add_vpc("vpc-main", &[("Name", VPC_NAME)])
        .add_vpc("vpc-other", &[("Name", "legacy")])
        .add_subnet("subnet-public-a", "vpc-main", &[("Public", "1")])
        .add_subnet("subnet-public-b", "vpc-main", &[("Public", "1")])
        .add_subnet("subnet-private", "vpc-main", &[("Public", "0")])
        .add_image("ami-0old", "web-app", IMAGE_OWNER, "2024-01-10T08:00:00.000Z")
        .add_image("ami-0new", "web-app", IMAGE_OWNER, "2024-06-02T08:00:00.000Z")
        .add_certificate(CERTIFICATE_ARN, CERTIFICATE_DOMAIN, "ISSUED")
}

fn web_app() -> ConfigSource {
    ConfigSource::new().with("project", "web-app")
}

fn builder(cloud: &InMemoryCloud) -> TopologyBuilder {
    TopologyBuilder::new(Arc::new(cloud.clone()))
}

#[tokio::test]
async fn test_missing_project_makes_no_cloud_calls() {
    // No expectations: any call on the mock panics.
    let cloud = MockCloud::new();
    let builder = TopologyBuilder::new(Arc::new(cloud));

    let err = builder
        .provision(&ConfigSource::new(), "prod")
        .await
        .unwrap_err();
    assert!(err.is_configuration());

    let err = builder
        .preview(&ConfigSource::new(), "prod")
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_lookups_run_before_any_create() {
    let mut cloud = MockCloud::new();
    cloud.expect_backend().return_const(CloudBackend::Memory);
    cloud
        .expect_find_vpc()
        .times(1)
        .returning(|_| Ok(NetworkRef { id: "vpc-1".to_string() }));
    cloud.expect_find_subnets().times(1).returning(|query| {
        assert_eq!(query.vpc_id, "vpc-1");
        assert_eq!(query.tags.get("Public").map(String::as_str), Some("1"));
        Ok(SubnetSet {
            ids: vec!["subnet-a".to_string()],
        })
    });
    cloud.expect_find_image().times(1).returning(|query| {
        assert_eq!(query.name, "web-app");
        assert_eq!(query.owners, vec![IMAGE_OWNER.to_string()]);
        assert!(query.most_recent);
        Ok(ImageRef {
            id: "ami-1".to_string(),
            name: "web-app".to_string(),
            creation_date: None,
        })
    });
    cloud.expect_find_certificate().times(1).returning(|query| {
        assert_eq!(query.domain, CERTIFICATE_DOMAIN);
        Err(forge_iac::IacError::NotFound {
            kind: "certificate",
            query: query.to_string(),
        })
    });

    let err = TopologyBuilder::new(Arc::new(cloud))
        .provision(&web_app(), "prod")
        .await
        .unwrap_err();
    assert!(err.is_lookup());
}

#[tokio::test]
async fn test_web_app_prod_topology() {
    let cloud = seeded_cloud();
    let outputs = builder(&cloud).provision(&web_app(), "prod").await.unwrap();

    let groups = cloud.calls_for("create_security_group");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].target.as_deref(), Some("web-app-prod"));

    let instances = cloud.calls_for("create_instance");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].target.as_deref(), Some("subnet-public-a"));

    let balancers = cloud.calls_for("create_load_balancer");
    assert_eq!(balancers[0].target.as_deref(), Some("web-app-prod"));
    let target_groups = cloud.calls_for("create_target_group");
    assert_eq!(target_groups[0].target.as_deref(), Some("web-app-prod"));

    assert!(outputs.alb_address.starts_with("web-app-prod-"));
    assert!(outputs.alb_address.ends_with(".elb.amazonaws.com"));
    assert!(outputs.ec2_address.starts_with("ec2-"));
    assert_eq!(cloud.live_resource_count(), 7);
}

#[tokio::test]
async fn test_created_resources_match_declarations() {
    let temp = tempdir().unwrap();
    let cloud = seeded_cloud();
    builder(&cloud)
        .with_state_dir(temp.path())
        .provision(&web_app(), "prod")
        .await
        .unwrap();

    let state = builder(&cloud)
        .with_state_dir(temp.path())
        .load_state("prod")
        .unwrap();
    let attributes = |name: &str| state.resource(name).unwrap().attributes.clone();

    let sg = cloud
        .security_group(&attributes(names::SECURITY_GROUP)["id"])
        .unwrap();
    assert_eq!(sg.vpc_id, "vpc-main");
    assert_eq!(sg.ingress.len(), 4);
    assert_eq!(sg.egress.len(), 1);

    let instance = cloud.instance(&attributes(names::INSTANCE)["id"]).unwrap();
    assert_eq!(instance.ami, "ami-0new");
    assert_eq!(instance.subnet_id, "subnet-public-a");
    assert_eq!(instance.security_group_ids, vec![sg_id(&state)]);
    assert_eq!(instance.tags["Name"], "web-app-ec2-prod");
    assert_eq!(instance.tags["Environment"], "prod");
    assert_eq!(instance.tags["Pulumi"], "true");

    let alb = cloud
        .load_balancer(&attributes(names::LOAD_BALANCER)["arn"])
        .unwrap();
    assert_eq!(alb.subnets, vec!["subnet-public-a", "subnet-public-b"]);
    assert!(!alb.internal);

    let tg_arn = attributes(names::TARGET_GROUP)["arn"].clone();
    let instance_id = attributes(names::INSTANCE)["id"].clone();
    assert_eq!(cloud.attachments(), vec![(tg_arn.clone(), instance_id)]);

    let listeners = cloud.listeners();
    assert_eq!(listeners.len(), 2);
    for (_, listener) in listeners {
        match listener.port {
            80 => assert_eq!(
                listener.default_actions,
                vec![ListenerAction::<String>::Redirect {
                    protocol: ListenerProtocol::Https,
                    port: "443".to_string(),
                    status_code: RedirectStatus::Permanent,
                }]
            ),
            443 => {
                assert_eq!(listener.certificate_arn.as_deref(), Some(CERTIFICATE_ARN));
                assert_eq!(
                    listener.default_actions,
                    vec![ListenerAction::Forward {
                        target_group_arn: tg_arn.clone(),
                    }]
                );
            }
            other => panic!("unexpected listener port {other}"),
        }
    }
}

fn sg_id(state: &forge_topology::TopologyState) -> String {
    state.resource(names::SECURITY_GROUP).unwrap().attributes["id"].clone()
}

#[tokio::test]
async fn test_dependents_start_after_target_group_is_created() {
    let temp = tempdir().unwrap();
    let cloud = seeded_cloud();
    let builder = builder(&cloud).with_state_dir(temp.path());
    builder.provision(&web_app(), "prod").await.unwrap();

    let state = builder.load_state("prod").unwrap();
    let seq = |resource: &str, kind| sequence_of(&state.events, resource, kind).unwrap();

    assert!(seq(names::LOAD_BALANCER, EventKind::Created) < seq(names::TARGET_GROUP, EventKind::Started));
    for dependent in [names::ATTACHMENT, names::HTTP_LISTENER, names::HTTPS_LISTENER] {
        assert!(seq(names::TARGET_GROUP, EventKind::Created) < seq(dependent, EventKind::Started));
    }
    assert!(seq(names::INSTANCE, EventKind::Created) < seq(names::ATTACHMENT, EventKind::Started));
}

#[tokio::test]
async fn test_missing_certificate_aborts_before_declaration() {
    let cloud = InMemoryCloud::new()
        .add_vpc("vpc-main", &[("Name", VPC_NAME)])
        .add_subnet("subnet-public-a", "vpc-main", &[("Public", "1")])
        .add_image("ami-0new", "web-app", IMAGE_OWNER, "2024-06-02T08:00:00.000Z")
        .add_certificate("arn:aws:acm:us-east-1:0:certificate/x", "other.example.com", "ISSUED");

    let err = builder(&cloud)
        .provision(&web_app(), "prod")
        .await
        .unwrap_err();

    match &err {
        TopologyError::NotFound { kind, .. } => assert_eq!(*kind, "certificate"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cloud.live_resource_count(), 0);
    assert!(cloud
        .get_calls()
        .iter()
        .all(|call| call.method.starts_with("find_")));
}

#[tokio::test]
async fn test_empty_subnets_fail_before_instance_creation() {
    let cloud = InMemoryCloud::new()
        .add_vpc("vpc-main", &[("Name", VPC_NAME)])
        .add_subnet("subnet-private", "vpc-main", &[("Public", "0")])
        .add_image("ami-0new", "web-app", IMAGE_OWNER, "2024-06-02T08:00:00.000Z")
        .add_certificate(CERTIFICATE_ARN, CERTIFICATE_DOMAIN, "ISSUED");

    let err = builder(&cloud)
        .provision(&web_app(), "prod")
        .await
        .unwrap_err();

    match &err {
        TopologyError::InvalidDeclaration { resource, .. } => assert_eq!(resource, names::INSTANCE),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cloud.calls_for("create_instance").is_empty());
    assert_eq!(cloud.live_resource_count(), 0);
}

#[tokio::test]
async fn test_failed_load_balancer_produces_no_outputs() {
    let temp = tempdir().unwrap();
    let cloud = seeded_cloud().fail_on("create_load_balancer", "subnet limit reached");
    let builder = builder(&cloud).with_state_dir(temp.path());

    let err = builder.provision(&web_app(), "prod").await.unwrap_err();
    match &err {
        TopologyError::Provision {
            resource, created, ..
        } => {
            assert_eq!(resource, names::LOAD_BALANCER);
            assert!(created.contains(&names::SECURITY_GROUP.to_string()));
            assert!(created.contains(&names::INSTANCE.to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cloud.calls_for("create_target_group").is_empty());

    let state = builder.load_state("prod").unwrap();
    assert_eq!(state.state, ExecutionState::Failed);
    assert!(state.outputs.is_empty());
    assert!(builder.outputs("prod").is_err());
}

#[tokio::test]
async fn test_outputs_persist_and_destroy_round_trip() {
    let temp = tempdir().unwrap();
    let cloud = seeded_cloud();
    let builder = builder(&cloud).with_state_dir(temp.path());

    let outputs = builder.provision(&web_app(), "staging").await.unwrap();
    assert_eq!(builder.outputs("staging").unwrap(), outputs);

    let json = serde_json::to_string(&outputs).unwrap();
    let parsed: StackOutputs = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, outputs);
    assert!(json.contains("\"albAddress\"") && json.contains("\"ec2Address\""));

    let state = builder.destroy("staging").await.unwrap();
    assert_eq!(state.state, ExecutionState::Destroyed);
    assert!(state.resources.is_empty());
    assert_eq!(cloud.live_resource_count(), 0);
    assert!(builder.outputs("staging").is_err());
}

#[tokio::test]
async fn test_destroy_without_state() {
    let temp = tempdir().unwrap();
    let err = builder(&seeded_cloud())
        .with_state_dir(temp.path())
        .destroy("prod")
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::NoState { .. }));
}

#[tokio::test]
async fn test_preview_creates_nothing() {
    let cloud = seeded_cloud();
    let plan = builder(&cloud).preview(&web_app(), "prod").await.unwrap();

    assert_eq!(plan.resources.len(), 7);
    assert_eq!(plan.lookups.image.id, "ami-0new");
    assert!(plan.position(names::LOAD_BALANCER) < plan.position(names::TARGET_GROUP));
    assert!(plan.position(names::TARGET_GROUP) < plan.position(names::HTTPS_LISTENER));
    assert_eq!(
        plan.resource(names::TARGET_GROUP).unwrap().depends_on,
        vec![names::LOAD_BALANCER.to_string()]
    );
    assert_eq!(cloud.live_resource_count(), 0);
    assert!(plan.to_string().contains("+ albTargetGroup (target_group) after alb"));
}

#[tokio::test]
async fn test_second_up_keeps_recorded_resources() {
    let temp = tempdir().unwrap();
    let cloud = seeded_cloud();
    let builder = builder(&cloud).with_state_dir(temp.path());

    builder.provision(&web_app(), "prod").await.unwrap();
    let first = builder.load_state("prod").unwrap();

    let err = builder.provision(&web_app(), "prod").await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("destroy it first"));
    assert_eq!(cloud.calls_for("create_security_group").len(), 1);

    let kept = builder.load_state("prod").unwrap();
    assert_eq!(kept.run_id, first.run_id);
    assert_eq!(kept.resources.len(), 7);

    builder.destroy("prod").await.unwrap();
    assert_eq!(cloud.live_resource_count(), 0);

    // A destroyed stack can be brought up again.
    builder.provision(&web_app(), "prod").await.unwrap();
    assert_eq!(cloud.live_resource_count(), 7);
}
