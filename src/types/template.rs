use super::{expr::Expr, resources::Resource};

use serde::Serialize;
use std::collections::BTreeMap;

const FORMAT_VERSION: &str = "2010-09-09";

/// A CloudFormation template. Maps are ordered by logical id so that the same
/// stack always renders the same document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,
    resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Resources of a CloudFormation type, e.g. `AWS::IAM::Role`.
    pub fn resources_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.type_name() == type_name)
            .map(|(logical_id, resource)| (logical_id.as_str(), resource))
    }

    /// Return true if a resource or parameter already uses the logical id.
    pub(crate) fn has_entity(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id) || self.parameters.contains_key(logical_id)
    }

    pub(crate) fn insert_resource(&mut self, logical_id: String, resource: Resource) {
        self.resources.insert(logical_id, resource);
    }

    pub(crate) fn insert_parameter(&mut self, logical_id: String, parameter: Parameter) {
        self.parameters.insert(logical_id, parameter);
    }

    pub(crate) fn insert_output(&mut self, logical_id: String, output: Output) -> bool {
        if self.outputs.contains_key(&logical_id) {
            return false;
        }
        self.outputs.insert(logical_id, output);
        true
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

/// A deploy-time input of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    parameter_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Parameter {
    pub fn string() -> Self {
        Self {
            parameter_type: "String".to_string(),
            default: None,
            description: None,
        }
    }

    pub fn default_value(self, value: Option<impl Into<String>>) -> Self {
        Self {
            default: value.map(Into::into),
            ..self
        }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn get_default(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    value: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Output {
    pub fn new(value: Expr, description: Option<&str>) -> Self {
        Self {
            value,
            description: description.map(str::to_string),
        }
    }

    pub fn value(&self) -> &Expr {
        &self.value
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}
