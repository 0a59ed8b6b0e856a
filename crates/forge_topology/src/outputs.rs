//! Stack outputs.

use std::collections::BTreeMap;

use forge_core::StackState;
use forge_iac::{attrs, ResourceSpec};
use serde::{Deserialize, Serialize};

use crate::defaults::names;
use crate::error::{TopologyError, TopologyResult};

pub const ALB_ADDRESS: &str = "albAddress";
pub const EC2_ADDRESS: &str = "ec2Address";

/// Public addresses of the load balancer and the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputs {
    pub alb_address: String,
    pub ec2_address: String,
}

impl StackOutputs {
    /// Read the addresses from the attributes of the created resources.
    pub fn from_state(state: &StackState<ResourceSpec>) -> TopologyResult<Self> {
        Ok(Self {
            alb_address: attribute(state, names::LOAD_BALANCER, attrs::DNS_NAME)?,
            ec2_address: attribute(state, names::INSTANCE, attrs::PUBLIC_DNS)?,
        })
    }

    /// Read outputs previously recorded in the state.
    pub fn recorded(state: &StackState<ResourceSpec>) -> Option<Self> {
        Some(Self {
            alb_address: state.outputs.get(ALB_ADDRESS)?.clone(),
            ec2_address: state.outputs.get(EC2_ADDRESS)?.clone(),
        })
    }

    /// Record the outputs in the state.
    pub fn record(&self, state: &mut StackState<ResourceSpec>) {
        state.outputs = self.to_map();
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ALB_ADDRESS.to_string(), self.alb_address.clone()),
            (EC2_ADDRESS.to_string(), self.ec2_address.clone()),
        ])
    }
}

fn attribute(
    state: &StackState<ResourceSpec>,
    resource: &str,
    attribute: &'static str,
) -> TopologyResult<String> {
    state
        .resource(resource)
        .and_then(|record| record.attributes.get(attribute))
        .cloned()
        .ok_or_else(|| TopologyError::Provision {
            resource: resource.to_string(),
            message: format!("missing '{}' attribute", attribute),
            created: state.resource_names(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let outputs = StackOutputs {
            alb_address: "web-app-prod-1.us-east-1.elb.amazonaws.com".to_string(),
            ec2_address: "ec2-54-0-0-1.compute-1.amazonaws.com".to_string(),
        };
        let json = serde_json::to_value(&outputs).unwrap();

        assert_eq!(json.as_object().unwrap().len(), 2);
        assert_eq!(json["albAddress"], "web-app-prod-1.us-east-1.elb.amazonaws.com");
        assert_eq!(json["ec2Address"], "ec2-54-0-0-1.compute-1.amazonaws.com");
    }

    #[test]
    fn test_map_keys() {
        let outputs = StackOutputs {
            alb_address: "a".to_string(),
            ec2_address: "b".to_string(),
        };
        let keys: Vec<_> = outputs.to_map().into_keys().collect();
        assert_eq!(keys, vec![ALB_ADDRESS, EC2_ADDRESS]);
    }
}
