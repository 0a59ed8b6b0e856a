//! Fixed values of the topology.

/// `Name` tag of the VPC the stack deploys into.
pub const VPC_NAME: &str = "custom-default-network";

/// Tag marking public subnets.
pub const PUBLIC_SUBNET_TAG: (&str, &str) = ("Public", "1");

/// Account that publishes the project images.
pub const IMAGE_OWNER: &str = "137130492928";

pub const CERTIFICATE_DOMAIN: &str = "pulumi-test.com";

pub const INSTANCE_TYPE: &str = "t2.micro";
pub const ROOT_VOLUME_SIZE_GIB: i32 = 32;
pub const ROOT_VOLUME_TYPE: &str = "gp3";
pub const KEY_NAME: &str = "pulumi-test";

/// Boot script: turn the instance into a single-node swarm manager.
pub const USER_DATA: &str = "#!/bin/bash\ndocker swarm init";

pub const SECURITY_GROUP_DESCRIPTION: &str = "Managed by Pulumi";
pub const TLS_POLICY: &str = "ELBSecurityPolicy-2016-08";

pub const HTTP_PORT: i32 = 80;
pub const HTTPS_PORT: i32 = 443;
pub const SSH_PORT: i32 = 22;

/// Provenance marker applied to every taggable resource.
pub const PROVENANCE_TAG: (&str, &str) = ("Pulumi", "true");

pub const DEFAULT_REGION: &str = "us-east-1";

/// Logical resource names within the stack.
pub mod names {
    pub const SECURITY_GROUP: &str = "securityGroup";
    pub const INSTANCE: &str = "ec2";
    pub const LOAD_BALANCER: &str = "alb";
    pub const TARGET_GROUP: &str = "albTargetGroup";
    pub const ATTACHMENT: &str = "targetGroupAttachment";
    pub const HTTP_LISTENER: &str = "listener";
    pub const HTTPS_LISTENER: &str = "listenerHTTPS";
}
