//! Read-only lookups of pre-existing cloud objects.
//!
//! None of these objects are created or destroyed by a stack; they are
//! resolved once, before anything is declared.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

/// Resource tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

fn format_tags(tags: &Tags) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Find a VPC by tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcQuery {
    pub tags: Tags,
}

impl VpcQuery {
    pub fn tagged(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tags: Tags::from([(key.into(), value.into())]),
        }
    }
}

impl fmt::Display for VpcQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tags[{}]", format_tags(&self.tags))
    }
}

/// Find the subnets of a VPC carrying the given tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetQuery {
    pub vpc_id: String,
    pub tags: Tags,
}

impl fmt::Display for SubnetQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vpc={} tags[{}]", self.vpc_id, format_tags(&self.tags))
    }
}

/// Find a machine image by exact name among the given owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuery {
    pub name: String,
    pub owners: Vec<String>,
    /// Pick the newest match instead of rejecting multiple matches
    pub most_recent: bool,
}

impl fmt::Display for ImageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name={} owners=[{}]", self.name, self.owners.join(","))
    }
}

/// Find a TLS certificate by exact domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateQuery {
    pub domain: String,
    pub statuses: Vec<String>,
}

impl CertificateQuery {
    /// Issued certificates for `domain`.
    pub fn issued(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            statuses: vec!["ISSUED".to_string()],
        }
    }
}

impl fmt::Display for CertificateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain={} statuses=[{}]", self.domain, self.statuses.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub id: String,
}

/// Subnet ids in provider response order.
///
/// The order is not stable across calls; callers that need "a" subnet
/// should not rely on getting the same one each time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSet {
    pub ids: Vec<String>,
}

impl SubnetSet {
    pub fn first(&self) -> Option<&str> {
        self.ids.first().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    pub name: String,
    /// ISO-8601 creation timestamp as reported by the provider
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRef {
    pub arn: String,
    pub domain: String,
}

/// Require exactly one match.
pub fn select_single<T>(kind: &'static str, query: String, mut matches: Vec<T>) -> IacResult<T> {
    match matches.len() {
        0 => Err(IacError::NotFound { kind, query }),
        1 => Ok(matches.remove(0)),
        count => Err(IacError::Ambiguous { kind, query, count }),
    }
}

/// Pick an image among candidates already filtered by name and owner.
///
/// With `most_recent`, the latest creation date wins and ties go to the
/// lexically smallest id. Without it, more than one candidate is ambiguous.
pub fn select_image(query: &ImageQuery, mut candidates: Vec<ImageRef>) -> IacResult<ImageRef> {
    if !query.most_recent || candidates.len() < 2 {
        return select_single("image", query.to_string(), candidates);
    }

    candidates.sort_by(|a, b| {
        b.creation_date
            .cmp(&a.creation_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(candidates.remove(0))
}
