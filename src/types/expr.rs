use serde::Serialize;

/// `${AWS::Partition}` inside an `Fn::Sub` template.
pub const PARTITION: &str = "${AWS::Partition}";

/// `${AWS::Region}` inside an `Fn::Sub` template.
pub const REGION: &str = "${AWS::Region}";

/// `${AWS::AccountId}` inside an `Fn::Sub` template.
pub const ACCOUNT_ID: &str = "${AWS::AccountId}";

/// A template value. Either known at synthesis time or resolved by CloudFormation
/// at deploy time through an intrinsic function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Expr {
    Literal(String),
    Ref {
        #[serde(rename = "Ref")]
        logical_id: String,
    },
    GetAtt {
        #[serde(rename = "Fn::GetAtt")]
        target: [String; 2],
    },
    Sub {
        #[serde(rename = "Fn::Sub")]
        template: String,
    },
}

impl Expr {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Self::Ref {
            logical_id: logical_id.into(),
        }
    }

    pub fn attr(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt {
            target: [logical_id.into(), attribute.into()],
        }
    }

    /// `Fn::Sub` with the template taken as-is, so pseudo parameters such as
    /// [`PARTITION`] are substituted.
    pub fn sub(template: impl Into<String>) -> Self {
        Self::Sub {
            template: template.into(),
        }
    }

    /// Concatenate parts. Stays a literal when every part is one.
    pub fn join(parts: impl IntoIterator<Item = Expr>) -> Self {
        let parts: Vec<Expr> = parts.into_iter().collect();

        if parts.iter().all(|part| part.as_literal().is_some()) {
            let value = parts
                .iter()
                .filter_map(Expr::as_literal)
                .collect::<String>();
            return Self::Literal(value);
        }

        let template = parts.iter().map(Expr::sub_fragment).collect::<String>();
        Self::sub(template)
    }

    pub fn suffixed(&self, suffix: &str) -> Self {
        Self::join([self.clone(), Self::literal(suffix)])
    }

    pub fn prefixed(&self, prefix: &str) -> Self {
        Self::join([Self::literal(prefix), self.clone()])
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// The expression as a piece of an `Fn::Sub` template.
    fn sub_fragment(&self) -> String {
        match self {
            Self::Literal(value) => escape(value),
            Self::Ref { logical_id } => format!("${{{logical_id}}}"),
            Self::GetAtt {
                target: [logical_id, attribute],
            } => format!("${{{logical_id}.{attribute}}}"),
            Self::Sub { template } => template.clone(),
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Escape text so that `Fn::Sub` writes it back verbatim.
pub fn escape(value: &str) -> String {
    value.replace("${", "${!")
}

/// ARN of a role in another account, known at synthesis time up to the partition.
pub fn role_arn(account_id: &str, role_name: &str) -> Expr {
    Expr::sub(format!(
        "arn:{PARTITION}:iam::{}:role/{}",
        escape(account_id),
        escape(role_name)
    ))
}

/// ARN of the root principal of an account.
pub fn account_root_arn(account_id: &str) -> Expr {
    Expr::sub(format!("arn:{PARTITION}:iam::{}:root", escape(account_id)))
}

/// ARN of a bucket referenced by name.
pub fn bucket_arn(bucket_name: &str) -> Expr {
    Expr::sub(format!("arn:{PARTITION}:s3:::{}", escape(bucket_name)))
}

/// ARN of an AWS managed policy, e.g. `service-role/AWSGlueServiceRole`.
pub fn managed_policy_arn(name: &str) -> Expr {
    Expr::sub(format!("arn:{PARTITION}:iam::aws:policy/{}", escape(name)))
}

/// ARN of a KMS resource (`key/<id>` or `alias/<name>`). The region falls back
/// to the deploying stack's region.
pub fn kms_arn(region: Option<&str>, account_id: &str, resource: &str) -> Expr {
    let region = region.map(escape).unwrap_or_else(|| REGION.to_string());
    Expr::sub(format!(
        "arn:{PARTITION}:kms:{region}:{}:{}",
        escape(account_id),
        escape(resource)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intrinsics_serialize_as_cloudformation_functions() {
        assert_eq!(serde_json::to_value(Expr::literal("a")).unwrap(), json!("a"));
        assert_eq!(
            serde_json::to_value(Expr::reference("Bucket")).unwrap(),
            json!({ "Ref": "Bucket" })
        );
        assert_eq!(
            serde_json::to_value(Expr::attr("Bucket", "Arn")).unwrap(),
            json!({ "Fn::GetAtt": ["Bucket", "Arn"] })
        );
        assert_eq!(
            serde_json::to_value(Expr::sub("x-${AWS::Region}")).unwrap(),
            json!({ "Fn::Sub": "x-${AWS::Region}" })
        );
    }

    #[test]
    fn joining_literals_stays_literal() {
        let joined = Expr::literal("bucket").suffixed("/*");
        assert_eq!(joined, Expr::literal("bucket/*"));
    }

    #[test]
    fn joining_intrinsics_builds_a_sub_template() {
        assert_eq!(
            Expr::attr("Bucket", "Arn").suffixed("/dynamodb/*"),
            Expr::sub("${Bucket.Arn}/dynamodb/*")
        );
        assert_eq!(
            Expr::reference("Bucket").prefixed("s3://"),
            Expr::sub("s3://${Bucket}")
        );
    }

    #[test]
    fn literal_placeholders_are_escaped_inside_sub() {
        let joined = Expr::join([Expr::reference("Table"), Expr::literal("/${not-a-var}")]);
        assert_eq!(joined, Expr::sub("${Table}/${!not-a-var}"));
    }

    #[test]
    fn kms_arn_defaults_to_the_stack_region() {
        assert_eq!(
            kms_arn(None, "111122223333", "alias/DataLake"),
            Expr::sub("arn:${AWS::Partition}:kms:${AWS::Region}:111122223333:alias/DataLake")
        );
        assert_eq!(
            kms_arn(Some("ap-northeast-1"), "111122223333", "key/abc"),
            Expr::sub("arn:${AWS::Partition}:kms:ap-northeast-1:111122223333:key/abc")
        );
    }
}
