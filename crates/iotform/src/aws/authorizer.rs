//! IoT custom authorizers.
//!
//! An active authorizer cannot be deleted. Delete first sets it inactive.
use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use aws_sdk_iot::types::AuthorizerStatus;

use super::{aws_tags, Iot};
use crate::{CallbackContext, DeletePreparation, Fault, Page, Resource, TagSet};

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authorizer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_function_arn: Option<String>,
    /// `ACTIVE` or `INACTIVE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_key_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token_signing_public_keys: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_caching_for_http: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

impl Authorizer {
    fn is_active(&self) -> bool {
        self.status.as_deref() == Some(AuthorizerStatus::Active.as_str())
    }

    fn aws_status(&self) -> Option<AuthorizerStatus> {
        self.status.as_deref().map(AuthorizerStatus::from)
    }

    fn aws_public_keys(&self) -> Option<HashMap<String, String>> {
        if self.token_signing_public_keys.is_empty() {
            None
        } else {
            Some(
                self.token_signing_public_keys
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        }
    }
}

impl Resource for Authorizer {
    type Provider = Iot;

    const TYPE_NAME: &'static str = "AWS::IoT::Authorizer";

    const IDENTIFIER_MAX_LENGTH: Option<usize> = Some(128);

    const TAGGABLE: bool = true;

    fn identifier(&self) -> Option<&str> {
        self.authorizer_name.as_deref()
    }

    fn set_identifier(&mut self, identifier: String) {
        self.authorizer_name = Some(identifier);
    }

    fn read_only_populated(&self) -> Vec<&'static str> {
        self.arn.iter().map(|_| "Arn").collect()
    }

    fn arn(&self) -> Option<&str> {
        self.arn.as_deref()
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
            .describe_authorizer()
            .set_authorizer_name(self.authorizer_name.clone())
            .send()
            .await?
            .authorizer_description
            .context("no authorizer description")?;
        Ok(Authorizer {
            authorizer_name: description.authorizer_name,
            arn: description.authorizer_arn,
            authorizer_function_arn: description.authorizer_function_arn,
            status: description.status.map(|s| s.as_str().to_owned()),
            token_key_name: description.token_key_name,
            token_signing_public_keys: description
                .token_signing_public_keys
                .unwrap_or_default()
                .into_iter()
                .collect(),
            signing_disabled: Option::<bool>::from(description.signing_disabled),
            enable_caching_for_http: Option::<bool>::from(description.enable_caching_for_http),
            tags: None,
        })
    }

    async fn create(&self, iot: &Iot, tags: &TagSet) -> Result<Self, Fault> {
        let out = iot
            .client()
            .create_authorizer()
            .set_authorizer_name(self.authorizer_name.clone())
            .set_authorizer_function_arn(self.authorizer_function_arn.clone())
            .set_token_key_name(self.token_key_name.clone())
            .set_token_signing_public_keys(self.aws_public_keys())
            .set_status(self.aws_status())
            .set_signing_disabled(self.signing_disabled)
            .set_enable_caching_for_http(self.enable_caching_for_http)
            .set_tags(aws_tags(tags)?)
            .send()
            .await?;
        let arn = out
            .authorizer_arn
            .context("missing arn from authorizer creation")?;
        log::info!("...created authorizer {arn}");
        Ok(Authorizer {
            arn: Some(arn),
            ..self.clone()
        })
    }

    async fn update(&self, iot: &Iot, observed: &Self) -> Result<Self, Fault> {
        if self.signing_disabled.unwrap_or(false) != observed.signing_disabled.unwrap_or(false) {
            return Err(Fault::InvalidInput {
                message: "SigningDisabled cannot be updated".to_owned(),
            });
        }
        let out = iot
            .client()
            .update_authorizer()
            .set_authorizer_name(self.authorizer_name.clone())
            .set_authorizer_function_arn(self.authorizer_function_arn.clone())
            .set_token_key_name(self.token_key_name.clone())
            .set_token_signing_public_keys(self.aws_public_keys())
            .set_status(self.aws_status())
            .set_enable_caching_for_http(self.enable_caching_for_http)
            .send()
            .await?;
        Ok(Authorizer {
            arn: out.authorizer_arn.or_else(|| observed.arn.clone()),
            ..self.clone()
        })
    }

    async fn prepare_delete(
        &self,
        iot: &Iot,
        observed: &Self,
        _context: &CallbackContext,
    ) -> Result<DeletePreparation, Fault> {
        if observed.is_active() {
            log::info!(
                "...deactivating authorizer {} before delete",
                self.authorizer_name.as_deref().unwrap_or_default()
            );
            let _ = iot
                .client()
                .update_authorizer()
                .set_authorizer_name(self.authorizer_name.clone())
                .status(AuthorizerStatus::Inactive)
                .send()
                .await?;
        }
        Ok(DeletePreparation::Ready)
    }

    async fn delete(&self, iot: &Iot) -> Result<(), Fault> {
        let _ = iot
            .client()
            .delete_authorizer()
            .set_authorizer_name(self.authorizer_name.clone())
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
            .list_authorizers()
            .set_marker(next_token)
            .send()
            .await?;
        let models = out
            .authorizers
            .unwrap_or_default()
            .into_iter()
            .map(|summary| Authorizer {
                authorizer_name: summary.authorizer_name,
                arn: summary.authorizer_arn,
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
    fn status_strings_match_the_sdk() {
        let mut authorizer = Authorizer {
            status: Some("ACTIVE".into()),
            ..Default::default()
        };
        assert!(authorizer.is_active());
        assert_eq!(Some(AuthorizerStatus::Active), authorizer.aws_status());

        authorizer.status = Some("INACTIVE".into());
        assert!(!authorizer.is_active());
        assert_eq!(Some(AuthorizerStatus::Inactive), authorizer.aws_status());

        authorizer.status = None;
        assert!(!authorizer.is_active());
        assert!(authorizer.aws_public_keys().is_none());
    }
}
