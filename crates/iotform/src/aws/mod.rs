//! Iotform for AWS IoT.
use std::collections::BTreeSet;

pub use aws_config::SdkConfig;
use aws_sdk_iot::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types as aws,
};

use crate::{
    tags::{TagPage, TagService},
    Fault, TagSet,
};

pub mod account_audit_configuration;
pub mod authorizer;
pub mod role_alias;
pub mod thing_type;

/// Handle to the AWS IoT control plane.
///
/// Constructed from an `SdkConfig` and passed to a [`Reconciler`](crate::Reconciler);
/// there is no global client.
#[derive(Clone, Debug)]
pub struct Iot {
    client: aws_sdk_iot::Client,
    account_id: Option<String>,
}

impl Iot {
    pub fn new(cfg: &SdkConfig) -> Self {
        Iot {
            client: aws_sdk_iot::Client::new(cfg),
            account_id: None,
        }
    }

    /// Loads the default AWS configuration from the environment.
    pub async fn from_env() -> Self {
        let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(&cfg)
    }

    /// Sets the account the handlers act on behalf of.
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn client(&self) -> &aws_sdk_iot::Client {
        &self.client
    }
}

impl AsRef<aws_sdk_iot::Client> for Iot {
    fn as_ref(&self) -> &aws_sdk_iot::Client {
        &self.client
    }
}

impl<E, R> From<SdkError<E, R>> for Fault
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(error: SdkError<E, R>) -> Self {
        let service_error = error.as_service_error();
        let code = service_error.and_then(ProvideErrorMetadata::code);
        let message = service_error
            .and_then(ProvideErrorMetadata::message)
            .map(str::to_owned)
            .unwrap_or_else(|| DisplayErrorContext(&error).to_string());
        Fault::from_code(code, message)
    }
}

/// Converts a tag set into SDK tags, `None` when there are no tags.
pub(crate) fn aws_tags(tags: &TagSet) -> Result<Option<Vec<aws::Tag>>, Fault> {
    if tags.is_empty() {
        return Ok(None);
    }
    let tags = tags
        .iter()
        .map(|(key, value)| {
            aws::Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| Fault::InvalidInput {
                    message: format!("invalid tag '{key}': {e}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(tags))
}

pub(crate) fn tag_set(tags: Vec<aws::Tag>) -> TagSet {
    tags.into_iter()
        .filter_map(|tag| {
            let key = Option::<String>::from(tag.key)?;
            let value = Option::<String>::from(tag.value).unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

impl TagService for Iot {
    async fn list_tags(&self, arn: &str, next_token: Option<String>) -> Result<TagPage, Fault> {
        let out = self
            .client
            .list_tags_for_resource()
            .resource_arn(arn)
            .set_next_token(next_token)
            .send()
            .await?;
        Ok(TagPage {
            tags: tag_set(out.tags.unwrap_or_default()),
            next_token: out.next_token,
        })
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> Result<(), Fault> {
        let _ = self
            .client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(aws_tags(tags)?)
            .send()
            .await?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &BTreeSet<String>) -> Result<(), Fault> {
        let _ = self
            .client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys.iter().cloned().collect()))
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sdk_tags_round_into_tag_sets() {
        let tags: TagSet = [("team", "iot"), ("empty", "")].into_iter().collect();
        let sdk = aws_tags(&tags).unwrap().unwrap();
        assert_eq!(2, sdk.len());
        assert_eq!(tags, tag_set(sdk));
        assert!(aws_tags(&TagSet::new()).unwrap().is_none());
    }
}
