//! Resolution of the pre-existing cloud objects the topology builds on.

use std::sync::Arc;

use forge_iac::{
    CertificateQuery, CertificateRef, CloudApi, IacResult, ImageQuery, ImageRef, NetworkRef,
    SubnetQuery, SubnetSet, Tags, VpcQuery,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StackConfig;
use crate::defaults::{CERTIFICATE_DOMAIN, IMAGE_OWNER, PUBLIC_SUBNET_TAG, VPC_NAME};
use crate::error::TopologyResult;

/// Everything the declarators need from the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLookups {
    pub network: NetworkRef,
    pub subnets: SubnetSet,
    pub image: ImageRef,
    pub certificate: CertificateRef,
}

pub struct LookupResolver {
    cloud: Arc<dyn CloudApi>,
}

impl LookupResolver {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self { cloud }
    }

    pub fn image_query(config: &StackConfig) -> ImageQuery {
        ImageQuery {
            name: config.project.clone(),
            owners: vec![IMAGE_OWNER.to_string()],
            most_recent: true,
        }
    }

    /// Run every lookup. The subnet lookup waits for the VPC; the image and
    /// certificate lookups run alongside that chain.
    ///
    /// The first failure aborts the others.
    pub async fn resolve(&self, config: &StackConfig) -> TopologyResult<ResolvedLookups> {
        info!("Resolving lookups for {}", config.resource_name());

        let image_query = Self::image_query(config);
        let certificate_query = CertificateQuery::issued(CERTIFICATE_DOMAIN);

        let ((network, subnets), image, certificate) = tokio::try_join!(
            self.network(),
            self.cloud.find_image(&image_query),
            self.cloud.find_certificate(&certificate_query),
        )?;

        debug!(
            "Resolved vpc={} subnets={:?} image={} certificate={}",
            network.id, subnets.ids, image.id, certificate.arn
        );

        Ok(ResolvedLookups {
            network,
            subnets,
            image,
            certificate,
        })
    }

    async fn network(&self) -> IacResult<(NetworkRef, SubnetSet)> {
        let network = self.cloud.find_vpc(&VpcQuery::tagged("Name", VPC_NAME)).await?;
        let subnets = self
            .cloud
            .find_subnets(&SubnetQuery {
                vpc_id: network.id.clone(),
                tags: Tags::from([(
                    PUBLIC_SUBNET_TAG.0.to_string(),
                    PUBLIC_SUBNET_TAG.1.to_string(),
                )]),
            })
            .await?;
        Ok((network, subnets))
    }
}
