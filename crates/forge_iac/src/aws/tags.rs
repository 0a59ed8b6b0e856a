//! Tag conversion for EC2 and ELBv2 requests.

use aws_sdk_ec2::types::{ResourceType, Tag, TagSpecification};
use aws_sdk_elasticloadbalancingv2::types::Tag as ElbTag;

use crate::error::{IacError, IacResult};
use crate::lookup::Tags;

/// Tags applied at creation time, or `None` when there are none.
///
/// EC2 rejects a tag specification without tags.
pub fn ec2_tag_spec(resource_type: ResourceType, tags: &Tags) -> Option<TagSpecification> {
    if tags.is_empty() {
        return None;
    }
    let mut spec = TagSpecification::builder().resource_type(resource_type);
    for (key, value) in tags {
        spec = spec.tags(Tag::builder().key(key).value(value).build());
    }
    Some(spec.build())
}

pub fn elb_tags(tags: &Tags) -> IacResult<Vec<ElbTag>> {
    tags.iter()
        .map(|(key, value)| {
            ElbTag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| IacError::provision("tag", e.to_string()))
        })
        .collect()
}
