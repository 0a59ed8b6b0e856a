//! Deferred values: references to attributes computed by other resources.
//!
//! A declared attribute is either known up front (`Input::Value`) or is an
//! `OutputRef` to an attribute another resource reports once it is active.
//! Every `OutputRef` inside a declaration is an implicit dependency edge.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Computed attributes reported by a resource once it is active.
pub type Attributes = BTreeMap<String, String>;

/// Reference to a computed attribute of another declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: String,
    pub attribute: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// A declared attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    Value(String),
    Output(OutputRef),
}

impl Input {
    pub fn value(value: impl Into<String>) -> Self {
        Input::Value(value.into())
    }

    /// The referenced output, if this value is deferred.
    pub fn output_ref(&self) -> Option<&OutputRef> {
        match self {
            Input::Value(_) => None,
            Input::Output(r) => Some(r),
        }
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Value(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Value(value)
    }
}

impl From<OutputRef> for Input {
    fn from(output: OutputRef) -> Self {
        Input::Output(output)
    }
}

/// Attributes of every resource that has become active during a run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOutputs {
    resources: HashMap<String, Attributes>,
}

impl ResolvedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: impl Into<String>, attributes: Attributes) {
        self.resources.insert(resource.into(), attributes);
    }

    pub fn get(&self, resource: &str) -> Option<&Attributes> {
        self.resources.get(resource)
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    /// Look up one attribute of an active resource.
    pub fn attribute(&self, resource: &str, attribute: &str) -> CoreResult<&str> {
        self.resources
            .get(resource)
            .and_then(|attrs| attrs.get(attribute))
            .map(|v| v.as_str())
            .ok_or_else(|| CoreError::UnresolvedOutput {
                resource: resource.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Resolve a declared value to a concrete string.
    pub fn resolve(&self, input: &Input) -> CoreResult<String> {
        match input {
            Input::Value(v) => Ok(v.clone()),
            Input::Output(r) => self.attribute(&r.resource, &r.attribute).map(str::to_string),
        }
    }

    pub fn resolve_all(&self, inputs: &[Input]) -> CoreResult<Vec<String>> {
        inputs.iter().map(|i| self.resolve(i)).collect()
    }
}
