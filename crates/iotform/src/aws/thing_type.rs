//! IoT thing types.
//!
//! The IoT API only deletes thing types that have been deprecated for at
//! least five minutes, and a deleted thing type stays describable for a
//! while afterwards.
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use aws_sdk_iot::types as aws;

use super::{aws_tags, Iot};
use crate::{CallbackContext, DeletePreparation, Fault, Page, Resource, TagSet};

/// Seconds a thing type must stay deprecated before it can be deleted.
pub const DEPRECATION_COOL_DOWN_SECONDS: u32 = 300;

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThingTypeProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchable_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thing_type_description: Option<String>,
}

impl From<ThingTypeProperties> for aws::ThingTypeProperties {
    fn from(properties: ThingTypeProperties) -> Self {
        aws::ThingTypeProperties::builder()
            .set_searchable_attributes(properties.searchable_attributes)
            .set_thing_type_description(properties.thing_type_description)
            .build()
    }
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThingType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thing_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecate_thing_type: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thing_type_properties: Option<ThingTypeProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
    /// Unix seconds of the deprecation, as observed.
    #[serde(skip)]
    pub deprecated_at: Option<i64>,
}

impl ThingType {
    fn is_deprecated(&self) -> bool {
        self.deprecate_thing_type.unwrap_or(false)
    }

    async fn set_deprecated(&self, iot: &Iot, deprecated: bool) -> Result<(), Fault> {
        log::info!(
            "...{} thing type {}",
            if deprecated { "deprecating" } else { "undeprecating" },
            self.thing_type_name.as_deref().unwrap_or_default()
        );
        let _ = iot
            .client()
            .deprecate_thing_type()
            .set_thing_type_name(self.thing_type_name.clone())
            .undo_deprecate(!deprecated)
            .send()
            .await?;
        Ok(())
    }
}

/// Seconds left of the deprecation cool-down.
///
/// The deprecation date reported by the service decides when present.
/// `waited_seconds` counts requested delays, not elapsed time, and is only
/// used without a date.
pub fn cool_down_remaining(deprecated_at: Option<i64>, now: i64, waited_seconds: u32) -> u32 {
    let elapsed = match deprecated_at {
        Some(at) => u32::try_from(now.saturating_sub(at).max(0)).unwrap_or(u32::MAX),
        None => waited_seconds,
    };
    DEPRECATION_COOL_DOWN_SECONDS.saturating_sub(elapsed)
}

impl Resource for ThingType {
    type Provider = Iot;

    const TYPE_NAME: &'static str = "AWS::IoT::ThingType";

    const IDENTIFIER_MAX_LENGTH: Option<usize> = Some(128);

    const TAGGABLE: bool = true;

    const DELETE_STABILIZES: bool = true;

    fn identifier(&self) -> Option<&str> {
        self.thing_type_name.as_deref()
    }

    fn set_identifier(&mut self, identifier: String) {
        self.thing_type_name = Some(identifier);
    }

    fn read_only_populated(&self) -> Vec<&'static str> {
        [("Arn", self.arn.is_some()), ("Id", self.id.is_some())]
            .into_iter()
            .filter_map(|(name, populated)| populated.then_some(name))
            .collect()
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
        let out = iot
            .client()
            .describe_thing_type()
            .set_thing_type_name(self.thing_type_name.clone())
            .send()
            .await?;
        let metadata = out.thing_type_metadata;
        let deprecated = metadata
            .as_ref()
            .and_then(|m| Option::<bool>::from(m.deprecated))
            .unwrap_or(false);
        let deprecated_at = metadata
            .as_ref()
            .and_then(|m| m.deprecation_date.as_ref())
            .map(|date| date.secs());
        Ok(ThingType {
            thing_type_name: out.thing_type_name,
            arn: out.thing_type_arn,
            id: out.thing_type_id,
            deprecate_thing_type: Some(deprecated),
            thing_type_properties: out.thing_type_properties.map(|p| ThingTypeProperties {
                searchable_attributes: p.searchable_attributes,
                thing_type_description: p.thing_type_description,
            }),
            tags: None,
            deprecated_at,
        })
    }

    async fn create(&self, iot: &Iot, tags: &TagSet) -> Result<Self, Fault> {
        let out = iot
            .client()
            .create_thing_type()
            .set_thing_type_name(self.thing_type_name.clone())
            .set_thing_type_properties(self.thing_type_properties.clone().map(Into::into))
            .set_tags(aws_tags(tags)?)
            .send()
            .await?;
        let arn = out
            .thing_type_arn
            .context("missing arn from thing type creation")?;
        log::info!("...created thing type {arn}");
        let created = ThingType {
            arn: Some(arn),
            id: out.thing_type_id,
            ..self.clone()
        };
        if created.is_deprecated() {
            created.set_deprecated(iot, true).await?;
        }
        Ok(created)
    }

    async fn update(&self, iot: &Iot, observed: &Self) -> Result<Self, Fault> {
        if self.thing_type_properties.is_some()
            && self.thing_type_properties != observed.thing_type_properties
        {
            return Err(Fault::InvalidInput {
                message: "ThingTypeProperties cannot be updated".to_owned(),
            });
        }
        if self.is_deprecated() != observed.is_deprecated() {
            self.set_deprecated(iot, self.is_deprecated()).await?;
        }
        Ok(ThingType {
            arn: observed.arn.clone(),
            id: observed.id.clone(),
            thing_type_properties: observed.thing_type_properties.clone(),
            ..self.clone()
        })
    }

    async fn prepare_delete(
        &self,
        iot: &Iot,
        observed: &Self,
        context: &CallbackContext,
    ) -> Result<DeletePreparation, Fault> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        let remaining = if observed.is_deprecated() {
            cool_down_remaining(observed.deprecated_at, now, context.waited_seconds)
        } else {
            self.set_deprecated(iot, true).await?;
            DEPRECATION_COOL_DOWN_SECONDS
        };
        Ok(if remaining == 0 {
            DeletePreparation::Ready
        } else {
            DeletePreparation::Wait {
                delay_seconds: remaining,
            }
        })
    }

    async fn delete(&self, iot: &Iot) -> Result<(), Fault> {
        let _ = iot
            .client()
            .delete_thing_type()
            .set_thing_type_name(self.thing_type_name.clone())
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
            .list_thing_types()
            .set_next_token(next_token)
            .send()
            .await?;
        let models = out
            .thing_types
            .unwrap_or_default()
            .into_iter()
            .map(|definition| ThingType {
                thing_type_name: definition.thing_type_name,
                arn: definition.thing_type_arn,
                ..Default::default()
            })
            .collect();
        Ok(Page {
            models,
            next_token: out.next_token,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cool_down() {
        // freshly deprecated
        assert_eq!(300, cool_down_remaining(Some(1_000), 1_000, 0));
        assert_eq!(60, cool_down_remaining(Some(1_000), 1_240, 0));
        assert_eq!(0, cool_down_remaining(Some(1_000), 1_300, 0));
        assert_eq!(0, cool_down_remaining(Some(1_000), 9_999, 0));
        // an early re-invocation does not shorten the wait
        assert_eq!(200, cool_down_remaining(Some(1_000), 1_100, 300));
        // waited time counts when no timestamp was observed
        assert_eq!(60, cool_down_remaining(None, 1_000, 240));
        assert_eq!(0, cool_down_remaining(None, 1_000, 300));
        // a deprecation date ahead of the local clock counts as just now
        assert_eq!(300, cool_down_remaining(Some(2_000), 1_000, 0));
    }

    #[test]
    fn read_only_fields() {
        let thing_type = ThingType {
            thing_type_name: Some("sensor".into()),
            arn: Some("arn:aws:iot:us-east-1:123456789012:thingtype/sensor".into()),
            id: Some("id".into()),
            ..Default::default()
        };
        assert_eq!(vec!["Arn", "Id"], thing_type.read_only_populated());
        assert!(ThingType::default().read_only_populated().is_empty());
    }

    #[test]
    fn deprecation_date_is_not_serialized() {
        let thing_type = ThingType {
            thing_type_name: Some("sensor".into()),
            deprecate_thing_type: Some(true),
            deprecated_at: Some(1_000),
            ..Default::default()
        };
        assert_eq!(
            serde_json::json!({ "ThingTypeName": "sensor", "DeprecateThingType": true }),
            serde_json::to_value(&thing_type).unwrap()
        );
    }
}
