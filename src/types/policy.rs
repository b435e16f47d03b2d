use super::expr::{self, Expr};

use serde::Serialize;
use std::collections::BTreeMap;

const POLICY_VERSION: &str = "2012-10-17";

/// Condition operator restricting a statement to one principal ARN.
pub const ARN_EQUALS: &str = "ArnEquals";

/// Condition key holding the ARN of the calling principal.
pub const PRINCIPAL_ARN: &str = "aws:PrincipalArn";

/// An IAM policy document, used for identity, trust and resource policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    version: &'static str,
    statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement: statements,
        }
    }

    /// Create a document whose statements without an explicit sid are numbered
    /// in order.
    pub fn with_sids(statements: Vec<Statement>) -> Self {
        let statements = statements
            .into_iter()
            .enumerate()
            .map(|(index, statement)| match statement.sid {
                Some(_) => statement,
                None => statement.sid(index.to_string()),
            })
            .collect();

        Self::new(statements)
    }

    /// Trust policy letting the principal assume the role.
    pub fn assume_role(principal: Principal) -> Self {
        Self::new(vec![Statement::allow()
            .principal(principal)
            .actions(["sts:AssumeRole"])])
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statement
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Principal {
    #[serde(rename = "Service")]
    Service(String),
    #[serde(rename = "AWS")]
    Aws(Expr),
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    pub fn account(account_id: &str) -> Self {
        Self::Aws(expr::account_root_arn(account_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    effect: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal: Option<Principal>,
    action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resource: Vec<Expr>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    condition: BTreeMap<String, BTreeMap<String, Expr>>,
}

impl Statement {
    pub fn allow() -> Self {
        Self {
            sid: None,
            effect: "Allow",
            principal: None,
            action: vec![],
            resource: vec![],
            condition: BTreeMap::new(),
        }
    }

    /// Grant to any principal of `account_id`, restricted to the role
    /// `role_name` of that account by an `ArnEquals` condition.
    pub fn cross_account(account_id: &str, role_name: &str) -> Self {
        Self::allow()
            .principal(Principal::account(account_id))
            .arn_equals(PRINCIPAL_ARN, expr::role_arn(account_id, role_name))
    }

    pub fn sid(self, sid: impl Into<String>) -> Self {
        Self {
            sid: Some(sid.into()),
            ..self
        }
    }

    pub fn principal(self, principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            ..self
        }
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            let action = action.into();
            if !self.action.contains(&action) {
                self.action.push(action);
            }
        }
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Expr>) -> Self {
        self.resource.extend(resources);
        self
    }

    pub fn arn_equals(self, key: impl Into<String>, arn: Expr) -> Self {
        self.with_condition(ARN_EQUALS, key, arn)
    }

    pub fn with_condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        value: Expr,
    ) -> Self {
        self.condition
            .entry(operator.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    pub fn get_sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn get_principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn get_actions(&self) -> &[String] {
        &self.action
    }

    pub fn get_resources(&self) -> &[Expr] {
        &self.resource
    }

    pub fn condition(&self, operator: &str, key: &str) -> Option<&Expr> {
        self.condition
            .get(operator)
            .and_then(|conditions| conditions.get(key))
    }
}
