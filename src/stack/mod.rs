//! # Stacks
//!
//! A [`Stack`] is one CloudFormation template bound to a target account and
//! region. Resources are added under stack-unique logical ids, and the returned
//! [`ResourceRef`] is how other resources point at them.
//!
//! ```rust
//! use ddb_streaming_datalake::stack::{Stack, StackEnv};
//! use ddb_streaming_datalake::types::resources::LogGroupProperties;
//!
//! let mut stack = Stack::new("Demo", StackEnv::new("111122223333", None));
//! let group = stack
//!     .add_resource(
//!         "LogGroup",
//!         LogGroupProperties {
//!             log_group_name: "/demo".to_string(),
//!             retention_in_days: 90,
//!         },
//!     )
//!     .unwrap();
//!
//! stack.add_output("LogGroupArn", group.arn(), None).unwrap();
//! assert_eq!(stack.template().resources().len(), 1);
//! ```
//!
//! The producer and consumer halves of the pipeline are composed by
//! [`producer::builder`] and [`consumer::builder`].

mod assembly;
pub mod consumer;
pub mod processor;
pub mod producer;

use super::{
    error::Error,
    types::{
        expr,
        resources::{AliasProperties, KeyProperties},
        Expr, Output, Parameter, PolicyDocument, Principal, Resource, Statement, Template,
    },
};

pub use assembly::Assembly;

/// Key usage granted to roles that read or write encrypted data.
pub(crate) const KMS_ACTIONS: [&str; 5] = [
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
    "kms:DescribeKey",
];

/// Prefix of every bucket name derived from an account id.
pub const DATALAKE_BUCKET_PREFIX: &str = "dynamodb-streaming-datalake";

/// Bucket name used when no bucket is given for the account's data lake.
pub fn datalake_bucket_name(account_id: &str) -> String {
    format!("{DATALAKE_BUCKET_PREFIX}-{account_id}")
}

/// Key prefix used when none or only slashes are given.
pub const DEFAULT_S3_PREFIX: &str = "dynamodb/aws21";

/// Drop surrounding slashes from an object key prefix, falling back to
/// [`DEFAULT_S3_PREFIX`] when nothing is left.
pub fn normalize_prefix(prefix: &str) -> String {
    match prefix.trim_matches('/') {
        "" => DEFAULT_S3_PREFIX.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Normalize a KMS alias to the `alias/<name>` form.
pub fn alias_name(alias: &str) -> String {
    if alias.starts_with("alias/") {
        alias.to_string()
    } else {
        format!("alias/{alias}")
    }
}

/// A KMS key that lives outside the stack being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyReference {
    Arn(String),
    Id(String),
    Alias(String),
}

impl KeyReference {
    /// ARN of the key in `account_id`. Without a region the ARN resolves to the
    /// region the stack is deployed to.
    pub fn arn(&self, region: Option<&str>, account_id: &str) -> Expr {
        match self {
            Self::Arn(arn) => Expr::literal(arn.as_str()),
            Self::Id(id) => expr::kms_arn(region, account_id, &format!("key/{id}")),
            Self::Alias(alias) => expr::kms_arn(region, account_id, &alias_name(alias)),
        }
    }
}

/// Condition operator matching any value of a multi-valued key.
const FOR_ANY_VALUE_EQUALS: &str = "ForAnyValue:StringEquals";

/// Condition key holding the aliases of the KMS key being used.
const RESOURCE_ALIASES: &str = "kms:ResourceAliases";

/// A key that resources of a stack encrypt with.
///
/// IAM does not match alias ARNs against the key being used, so a key known
/// only by its alias is granted on every key of the account that carries the
/// alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUsage {
    arn: Expr,
    alias: Option<(Expr, String)>,
}

impl KeyUsage {
    /// A key declared in the stack being built.
    pub fn declared(key: &ResourceRef) -> Self {
        Self {
            arn: key.arn(),
            alias: None,
        }
    }

    pub fn external(key: &KeyReference, region: Option<&str>, account_id: &str) -> Self {
        let alias = match key {
            KeyReference::Alias(alias) => Some((
                expr::kms_arn(region, account_id, "key/*"),
                alias_name(alias),
            )),
            KeyReference::Arn(_) | KeyReference::Id(_) => None,
        };

        Self {
            arn: key.arn(region, account_id),
            alias,
        }
    }

    /// Identifier encryption settings point at.
    pub fn arn(&self) -> &Expr {
        &self.arn
    }

    /// Statement allowing `actions` on the key.
    pub fn grant<I, S>(&self, actions: I) -> Statement
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statement = Statement::allow().actions(actions);

        match &self.alias {
            Some((keys, alias)) => statement.resources([keys.clone()]).with_condition(
                FOR_ANY_VALUE_EQUALS,
                RESOURCE_ALIASES,
                Expr::literal(alias.as_str()),
            ),
            None => statement.resources([self.arn.clone()]),
        }
    }
}

/// Options of a customer managed key declared in a stack.
#[derive(Debug, Clone)]
pub(crate) struct KeyOptions<'a> {
    pub logical_id: &'a str,
    pub alias: &'a str,
    pub description: Option<&'a str>,
    pub rotation: bool,
    /// Statements granted on top of the owning account's administration.
    pub grants: Vec<Statement>,
}

/// Declare a key and its alias. The key policy always lets the owning account
/// administer the key through IAM.
pub(crate) fn declare_key(stack: &mut Stack, options: KeyOptions<'_>) -> Result<ResourceRef, Error> {
    let mut statements = vec![Statement::allow()
        .sid("Enable IAM User Permissions")
        .principal(Principal::account(stack.env().account()))
        .actions(["kms:*"])
        .resources([Expr::literal("*")])];
    statements.extend(options.grants);

    let key = stack.add_resource(
        options.logical_id,
        KeyProperties {
            description: options.description.map(str::to_string),
            enabled: true,
            enable_key_rotation: options.rotation,
            key_policy: PolicyDocument::new(statements),
        },
    )?;

    stack.add_resource(
        &format!("{}Alias", options.logical_id),
        AliasProperties {
            alias_name: alias_name(options.alias),
            target_key_id: key.reference(),
        },
    )?;

    Ok(key)
}

/// Target environment of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEnv {
    account: String,
    region: Option<String>,
}

impl StackEnv {
    pub fn new(account: impl Into<String>, region: Option<String>) -> Self {
        Self {
            account: account.into(),
            region,
        }
    }

    pub fn account(&self) -> &str {
        self.account.as_str()
    }

    /// `None` makes the stack deployable to any region.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// Handle to a resource or parameter added to a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    logical_id: String,
}

impl ResourceRef {
    fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
        }
    }

    pub fn logical_id(&self) -> &str {
        self.logical_id.as_str()
    }

    /// `Ref` of the resource. Its meaning depends on the resource type.
    pub fn reference(&self) -> Expr {
        Expr::reference(&self.logical_id)
    }

    pub fn attr(&self, attribute: &str) -> Expr {
        Expr::attr(&self.logical_id, attribute)
    }

    pub fn arn(&self) -> Expr {
        self.attr("Arn")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    env: StackEnv,
    template: Template,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: StackEnv) -> Self {
        Self {
            name: name.into(),
            env,
            template: Template::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn env(&self) -> &StackEnv {
        &self.env
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.template.set_description(description);
    }

    pub fn add_resource(
        &mut self,
        logical_id: &str,
        resource: impl Into<Resource>,
    ) -> Result<ResourceRef, Error> {
        self.ensure_unique(logical_id)?;
        self.template
            .insert_resource(logical_id.to_string(), resource.into());
        Ok(ResourceRef::new(logical_id))
    }

    pub fn add_parameter(
        &mut self,
        logical_id: &str,
        parameter: Parameter,
    ) -> Result<ResourceRef, Error> {
        self.ensure_unique(logical_id)?;
        self.template
            .insert_parameter(logical_id.to_string(), parameter);
        Ok(ResourceRef::new(logical_id))
    }

    pub fn add_output(
        &mut self,
        logical_id: &str,
        value: Expr,
        description: Option<&str>,
    ) -> Result<(), Error> {
        if self
            .template
            .insert_output(logical_id.to_string(), Output::new(value, description))
        {
            Ok(())
        } else {
            Err(self.duplicate(logical_id))
        }
    }

    /// Render the template as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.template)?)
    }

    fn ensure_unique(&self, logical_id: &str) -> Result<(), Error> {
        if self.template.has_entity(logical_id) {
            Err(self.duplicate(logical_id))
        } else {
            Ok(())
        }
    }

    fn duplicate(&self, logical_id: &str) -> Error {
        Error::DuplicateLogicalId {
            stack: self.name.clone(),
            logical_id: logical_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resources::LogGroupProperties;
    use itertools::Itertools;

    fn log_group(name: &str) -> LogGroupProperties {
        LogGroupProperties {
            log_group_name: name.to_string(),
            retention_in_days: 90,
        }
    }

    fn env() -> StackEnv {
        StackEnv::new("111122223333", Some("ap-northeast-1".to_string()))
    }

    #[test]
    fn logical_ids_are_unique_across_resources_and_parameters() {
        let mut stack = Stack::new("Demo", env());
        stack.add_resource("Group", log_group("/a")).unwrap();

        let err = stack.add_resource("Group", log_group("/b")).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateLogicalId { ref logical_id, .. } if logical_id == "Group"
        ));

        let err = stack.add_parameter("Group", Parameter::string()).unwrap_err();
        assert!(matches!(err, Error::DuplicateLogicalId { .. }));
    }

    #[test]
    fn outputs_have_their_own_namespace() {
        let mut stack = Stack::new("Demo", env());
        let group = stack.add_resource("Group", log_group("/a")).unwrap();

        assert!(stack.add_output("Group", group.arn(), None).is_ok());
        assert!(stack.add_output("Group", group.arn(), None).is_err());
    }

    #[test]
    fn rendering_does_not_depend_on_insertion_order() {
        let names = ["A", "B", "C", "D"];
        let expected = {
            let mut stack = Stack::new("Demo", env());
            for name in names {
                stack.add_resource(name, log_group(name)).unwrap();
            }
            stack.to_json().unwrap()
        };

        for order in names.into_iter().permutations(names.len()) {
            let mut stack = Stack::new("Demo", env());
            for name in order {
                stack.add_resource(name, log_group(name)).unwrap();
            }
            assert_eq!(stack.to_json().unwrap(), expected);
        }
    }

    #[test]
    fn key_references_resolve_to_arns() {
        assert_eq!(
            KeyReference::Alias("DataLake".to_string()).arn(None, "111122223333"),
            Expr::sub("arn:${AWS::Partition}:kms:${AWS::Region}:111122223333:alias/DataLake")
        );
        assert_eq!(
            KeyReference::Id("1234abcd".to_string()).arn(Some("eu-west-1"), "444455556666"),
            Expr::sub("arn:${AWS::Partition}:kms:eu-west-1:444455556666:key/1234abcd")
        );
        assert_eq!(
            KeyReference::Arn("arn:aws:kms:us-east-1:1:key/x".to_string()).arn(None, "1"),
            Expr::literal("arn:aws:kms:us-east-1:1:key/x")
        );
    }

    #[test]
    fn declared_keys_are_administered_by_their_account() {
        let mut stack = Stack::new("Demo", env());
        let key = declare_key(
            &mut stack,
            KeyOptions {
                logical_id: "Key",
                alias: "demo",
                description: None,
                rotation: true,
                grants: vec![],
            },
        )
        .unwrap();

        let template = serde_json::to_value(stack.template()).unwrap();
        let statement = &template["Resources"][key.logical_id()]["Properties"]["KeyPolicy"]
            ["Statement"][0];
        assert_eq!(
            statement["Principal"]["AWS"],
            serde_json::json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::111122223333:root" })
        );
        assert_eq!(
            template["Resources"]["KeyAlias"]["Properties"]["AliasName"],
            serde_json::json!("alias/demo")
        );
    }

    #[test]
    fn derived_bucket_names_embed_the_account() {
        assert_eq!(
            datalake_bucket_name("111122223333"),
            "dynamodb-streaming-datalake-111122223333"
        );
    }

    #[test]
    fn prefixes_lose_surrounding_slashes() {
        assert_eq!(normalize_prefix("/raw/ddb/"), "raw/ddb");
        assert_eq!(normalize_prefix("raw"), "raw");
        assert_eq!(normalize_prefix("//"), "dynamodb/aws21");
        assert_eq!(normalize_prefix(""), "dynamodb/aws21");
    }

    #[test]
    fn aliased_keys_are_granted_through_the_alias_condition() {
        let usage = KeyUsage::external(
            &KeyReference::Alias("DataLake".to_string()),
            None,
            "111122223333",
        );
        assert_eq!(
            usage.arn(),
            &Expr::sub("arn:${AWS::Partition}:kms:${AWS::Region}:111122223333:alias/DataLake")
        );

        let statement = usage.grant(KMS_ACTIONS);
        assert_eq!(
            statement.get_resources(),
            &[Expr::sub(
                "arn:${AWS::Partition}:kms:${AWS::Region}:111122223333:key/*"
            )]
        );
        assert_eq!(
            statement.condition("ForAnyValue:StringEquals", "kms:ResourceAliases"),
            Some(&Expr::literal("alias/DataLake"))
        );
    }

    #[test]
    fn keys_known_by_arn_are_granted_directly() {
        let usage = KeyUsage::external(
            &KeyReference::Id("1234abcd".to_string()),
            Some("eu-west-1"),
            "444455556666",
        );
        let statement = usage.grant(["kms:Decrypt"]);

        assert_eq!(statement.get_resources(), &[usage.arn().clone()]);
        assert_eq!(
            statement.condition("ForAnyValue:StringEquals", "kms:ResourceAliases"),
            None
        );
    }
}
