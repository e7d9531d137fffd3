//! IoT role aliases.
use anyhow::Context;

use super::{aws_tags, Iot};
use crate::{Fault, Page, Resource, TagSet};

/// A role alias, pointing devices at an IAM role for credential exchange.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleAlias {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_alias_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_duration_seconds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

impl Resource for RoleAlias {
    type Provider = Iot;

    const TYPE_NAME: &'static str = "AWS::IoT::RoleAlias";

    const IDENTIFIER_MAX_LENGTH: Option<usize> = Some(128);

    const TAGGABLE: bool = true;

    fn identifier(&self) -> Option<&str> {
        self.role_alias.as_deref()
    }

    fn set_identifier(&mut self, identifier: String) {
        self.role_alias = Some(identifier);
    }

    fn read_only_populated(&self) -> Vec<&'static str> {
        self.role_alias_arn
            .iter()
            .map(|_| "RoleAliasArn")
            .collect()
    }

    fn arn(&self) -> Option<&str> {
        self.role_alias_arn.as_deref()
    }

    fn resource_tags(&self) -> Option<&TagSet> {
        self.tags.as_ref()
    }

    fn set_resource_tags(&mut self, tags: TagSet) {
        self.tags = Some(tags);
    }

    async fn describe(&self, iot: &Iot) -> Result<Self, Fault> {
        let description = iot
            .client()
            .describe_role_alias()
            .set_role_alias(self.role_alias.clone())
            .send()
            .await?
            .role_alias_description
            .context("no role alias description")?;
        Ok(RoleAlias {
            role_alias: description.role_alias,
            role_alias_arn: description.role_alias_arn,
            role_arn: description.role_arn,
            credential_duration_seconds: Option::<i32>::from(
                description.credential_duration_seconds,
            ),
            tags: None,
        })
    }

    async fn create(&self, iot: &Iot, tags: &TagSet) -> Result<Self, Fault> {
        let out = iot
            .client()
            .create_role_alias()
            .set_role_alias(self.role_alias.clone())
            .set_role_arn(self.role_arn.clone())
            .set_credential_duration_seconds(self.credential_duration_seconds)
            .set_tags(aws_tags(tags)?)
            .send()
            .await?;
        let arn = out
            .role_alias_arn
            .context("missing arn from role alias creation")?;
        log::info!("...created role alias {arn}");
        Ok(RoleAlias {
            role_alias_arn: Some(arn),
            ..self.clone()
        })
    }

    async fn update(&self, iot: &Iot, observed: &Self) -> Result<Self, Fault> {
        let out = iot
            .client()
            .update_role_alias()
            .set_role_alias(self.role_alias.clone())
            .set_role_arn(self.role_arn.clone())
            .set_credential_duration_seconds(self.credential_duration_seconds)
            .send()
            .await?;
        Ok(RoleAlias {
            role_alias_arn: out
                .role_alias_arn
                .or_else(|| observed.role_alias_arn.clone()),
            ..self.clone()
        })
    }

    async fn delete(&self, iot: &Iot) -> Result<(), Fault> {
        let _ = iot
            .client()
            .delete_role_alias()
            .set_role_alias(self.role_alias.clone())
            .send()
            .await?;
        Ok(())
    }

    async fn list(
        iot: &Iot,
        _account_id: Option<&str>,
        next_token: Option<String>,
    ) -> Result<Page<Self>, Fault> {
        let out = iot
            .client()
            .list_role_aliases()
            .set_marker(next_token)
            .send()
            .await?;
        let models = out
            .role_aliases
            .unwrap_or_default()
            .into_iter()
            .map(|name| RoleAlias {
                role_alias: Some(name),
                ..Default::default()
            })
            .collect();
        Ok(Page {
            models,
            next_token: out.next_marker,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_alias_models_use_pascal_case() {
        let alias: RoleAlias = serde_json::from_value(serde_json::json!({
            "RoleAlias": "devices",
            "RoleArn": "arn:aws:iam::123456789012:role/devices",
            "CredentialDurationSeconds": 3600,
            "Tags": [{ "Key": "team", "Value": "iot" }],
        }))
        .unwrap();
        assert_eq!(Some("devices"), alias.identifier());
        assert_eq!(Some(3600), alias.credential_duration_seconds);
        assert_eq!(Some("iot"), alias.tags.as_ref().and_then(|t| t.get("team")));
        assert!(alias.read_only_populated().is_empty());

        let with_arn = RoleAlias {
            role_alias_arn: Some("arn:aws:iot:us-east-1:123456789012:rolealias/devices".into()),
            ..alias
        };
        assert_eq!(vec!["RoleAliasArn"], with_arn.read_only_populated());
    }
}
