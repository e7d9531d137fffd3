//! Device Defender audit configuration of an account.
//!
//! This is a singleton: describing it always succeeds, and the account is
//! only considered configured once a role ARN is set. The update call is
//! a partial one, so every check and notification target that is not
//! desired is sent explicitly disabled.
use std::collections::{BTreeMap, HashMap};

use anyhow::anyhow;
use aws_sdk_iot::types as aws;

use super::Iot;
use crate::{overlay::overlay_disabled, ExistenceStrategy, Fault, Page, Resource};

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditCheckConfiguration {
    pub enabled: bool,
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditNotificationTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountAuditConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// The sentinel: empty until the account is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Keyed by check name, e.g. `DeviceCertificateExpiringCheck`.
    #[serde(default)]
    pub audit_check_configurations: BTreeMap<String, AuditCheckConfiguration>,
    /// Keyed by notification type, e.g. `Sns`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub audit_notification_target_configurations: BTreeMap<String, AuditNotificationTarget>,
    /// The account the invocation acts in.
    #[serde(skip)]
    pub caller_account_id: Option<String>,
}

/// `DeviceCertificateExpiringCheck` to `DEVICE_CERTIFICATE_EXPIRING_CHECK`.
pub fn api_name(model_name: &str) -> String {
    let mut name = String::with_capacity(model_name.len() + 8);
    for (i, c) in model_name.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            name.push('_');
        }
        name.push(c.to_ascii_uppercase());
    }
    name
}

/// `DEVICE_CERTIFICATE_EXPIRING_CHECK` to `DeviceCertificateExpiringCheck`.
pub fn model_name(api_name: &str) -> String {
    api_name
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

impl AccountAuditConfiguration {
    /// The complete check and notification target payload of an update
    /// call, given what is configured now.
    pub fn patch_payload(
        &self,
        observed: Option<&Self>,
    ) -> (
        BTreeMap<String, AuditCheckConfiguration>,
        BTreeMap<String, AuditNotificationTarget>,
    ) {
        let Some(observed) = observed else {
            return (
                self.audit_check_configurations.clone(),
                self.audit_notification_target_configurations.clone(),
            );
        };
        let checks = overlay_disabled(
            &observed.audit_check_configurations,
            &self.audit_check_configurations,
            |_| AuditCheckConfiguration { enabled: false },
        );
        let targets = overlay_disabled(
            &observed.audit_notification_target_configurations,
            &self.audit_notification_target_configurations,
            |target| AuditNotificationTarget {
                enabled: false,
                ..target.clone()
            },
        );
        (checks, targets)
    }

    /// The account of the invocation, else the one the handle was built for.
    fn caller<'a>(&'a self, iot: &'a Iot) -> Option<&'a str> {
        self.caller_account_id.as_deref().or(iot.account_id())
    }

    /// The configuration can only be changed from within its own account.
    pub fn check_account(&self, caller: Option<&str>) -> Result<(), Fault> {
        match (self.account_id.as_deref(), caller) {
            (_, None) => Err(Fault::InvalidInput {
                message: "the account of the caller is unknown".to_owned(),
            }),
            (Some(model), Some(caller)) if model != caller => Err(Fault::InvalidInput {
                message: format!(
                    "AccountId '{model}' does not match the account of the caller"
                ),
            }),
            _ => Ok(()),
        }
    }

    /// The models a list reports, given whether the account is configured.
    pub fn listed(configured: bool, account_id: Option<&str>) -> Result<Vec<Self>, Fault> {
        if !configured {
            return Ok(vec![]);
        }
        let account_id = account_id.ok_or_else(|| {
            anyhow!("audits are configured but the account of the caller is unknown")
        })?;
        Ok(vec![AccountAuditConfiguration {
            account_id: Some(account_id.to_owned()),
            ..Default::default()
        }])
    }

    async fn put(&self, iot: &Iot, observed: Option<&Self>) -> Result<(), Fault> {
        self.check_account(self.caller(iot))?;
        let (checks, targets) = self.patch_payload(observed);
        let checks = checks
            .into_iter()
            .map(|(name, check)| {
                (
                    api_name(&name),
                    aws::AuditCheckConfiguration::builder()
                        .enabled(check.enabled)
                        .build(),
                )
            })
            .collect::<HashMap<_, _>>();
        let targets = targets
            .into_iter()
            .map(|(kind, target)| {
                (
                    aws::AuditNotificationType::from(api_name(&kind).as_str()),
                    aws::AuditNotificationTarget::builder()
                        .set_target_arn(target.target_arn)
                        .set_role_arn(target.role_arn)
                        .enabled(target.enabled)
                        .build(),
                )
            })
            .collect::<HashMap<_, _>>();
        log::info!(
            "...putting {} audit checks and {} notification targets",
            checks.len(),
            targets.len()
        );
        let _ = iot
            .client()
            .update_account_audit_configuration()
            .set_role_arn(self.role_arn.clone())
            .set_audit_check_configurations((!checks.is_empty()).then_some(checks))
            .set_audit_notification_target_configurations(
                (!targets.is_empty()).then_some(targets),
            )
            .send()
            .await?;
        Ok(())
    }
}

impl Resource for AccountAuditConfiguration {
    type Provider = Iot;

    const TYPE_NAME: &'static str = "AWS::IoT::AccountAuditConfiguration";

    const EXISTENCE: ExistenceStrategy = ExistenceStrategy::SentinelField;

    fn identifier(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    fn set_identifier(&mut self, identifier: String) {
        self.account_id = Some(identifier);
    }

    fn adopt_account(&mut self, account_id: &str) {
        if self.account_id.is_none() {
            self.account_id = Some(account_id.to_owned());
        }
        self.caller_account_id = Some(account_id.to_owned());
    }

    fn sentinel_present(&self) -> bool {
        self.role_arn.as_deref().is_some_and(|arn| !arn.is_empty())
    }

    async fn describe(&self, iot: &Iot) -> Result<Self, Fault> {
        let out = iot
            .client()
            .describe_account_audit_configuration()
            .send()
            .await?;
        let audit_check_configurations = out
            .audit_check_configurations
            .unwrap_or_default()
            .into_iter()
            .map(|(name, check)| {
                (
                    model_name(&name),
                    AuditCheckConfiguration {
                        enabled: Option::<bool>::from(check.enabled).unwrap_or(false),
                    },
                )
            })
            .collect();
        let audit_notification_target_configurations = out
            .audit_notification_target_configurations
            .unwrap_or_default()
            .into_iter()
            .map(|(kind, target)| {
                (
                    model_name(kind.as_str()),
                    AuditNotificationTarget {
                        target_arn: target.target_arn,
                        role_arn: target.role_arn,
                        enabled: Option::<bool>::from(target.enabled).unwrap_or(false),
                    },
                )
            })
            .collect();
        Ok(AccountAuditConfiguration {
            account_id: self
                .account_id
                .clone()
                .or_else(|| self.caller(iot).map(str::to_owned)),
            role_arn: out.role_arn.filter(|arn| !arn.is_empty()),
            audit_check_configurations,
            audit_notification_target_configurations,
            caller_account_id: self.caller_account_id.clone(),
        })
    }

    async fn create(&self, iot: &Iot, _tags: &crate::TagSet) -> Result<Self, Fault> {
        self.put(iot, None).await?;
        log::info!(
            "...configured audits of account {}",
            self.account_id.as_deref().unwrap_or_default()
        );
        Ok(self.clone())
    }

    async fn update(&self, iot: &Iot, observed: &Self) -> Result<Self, Fault> {
        self.put(iot, Some(observed)).await?;
        Ok(self.clone())
    }

    async fn delete(&self, iot: &Iot) -> Result<(), Fault> {
        self.check_account(self.caller(iot))?;
        let _ = iot
            .client()
            .delete_account_audit_configuration()
            .delete_scheduled_audits(true)
            .send()
            .await?;
        Ok(())
    }

    async fn list(
        iot: &Iot,
        account_id: Option<&str>,
        _next_token: Option<String>,
    ) -> Result<Page<Self>, Fault> {
        let configuration = AccountAuditConfiguration {
            caller_account_id: account_id.map(str::to_owned),
            ..Default::default()
        }
        .describe(iot)
        .await?;
        Ok(Page {
            models: Self::listed(
                configuration.sentinel_present(),
                configuration.account_id.as_deref(),
            )?,
            next_token: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn configuration(checks: &[(&str, bool)]) -> AccountAuditConfiguration {
        AccountAuditConfiguration {
            account_id: Some("123456789012".into()),
            role_arn: Some("arn:aws:iam::123456789012:role/audit".into()),
            audit_check_configurations: checks
                .iter()
                .map(|(name, enabled)| {
                    (name.to_string(), AuditCheckConfiguration { enabled: *enabled })
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn check_names_convert_both_ways() {
        for (model, api) in [
            ("DeviceCertificateExpiringCheck", "DEVICE_CERTIFICATE_EXPIRING_CHECK"),
            ("CaCertificateKeyQualityCheck", "CA_CERTIFICATE_KEY_QUALITY_CHECK"),
            (
                "IotPolicyOverlyPermissiveCheck",
                "IOT_POLICY_OVERLY_PERMISSIVE_CHECK",
            ),
            ("Sns", "SNS"),
        ] {
            assert_eq!(api, api_name(model));
            assert_eq!(model, model_name(api));
        }
    }

    #[test]
    fn stale_checks_are_disabled_on_update() {
        let observed = configuration(&[
            ("DeviceCertificateExpiringCheck", true),
            ("CaCertificateExpiringCheck", true),
        ]);
        let desired = configuration(&[("DeviceCertificateExpiringCheck", false)]);
        let (checks, targets) = desired.patch_payload(Some(&observed));
        assert_eq!(
            configuration(&[
                ("CaCertificateExpiringCheck", false),
                ("DeviceCertificateExpiringCheck", false),
            ])
            .audit_check_configurations,
            checks
        );
        assert!(targets.is_empty());
    }

    #[test]
    fn stale_notification_targets_keep_their_arns() {
        let mut observed = configuration(&[]);
        observed.audit_notification_target_configurations.insert(
            "Sns".into(),
            AuditNotificationTarget {
                target_arn: Some("arn:aws:sns:us-east-1:123456789012:audits".into()),
                role_arn: Some("arn:aws:iam::123456789012:role/notify".into()),
                enabled: true,
            },
        );
        let (_, targets) = configuration(&[]).patch_payload(Some(&observed));
        let sns = &targets["Sns"];
        assert!(!sns.enabled);
        assert_eq!(
            Some("arn:aws:sns:us-east-1:123456789012:audits"),
            sns.target_arn.as_deref()
        );
    }

    #[test]
    fn list_needs_a_known_account() {
        assert!(AccountAuditConfiguration::listed(false, None).unwrap().is_empty());
        let listed = AccountAuditConfiguration::listed(true, Some("123456789012")).unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(Some("123456789012"), listed[0].account_id.as_deref());
        assert!(matches!(
            AccountAuditConfiguration::listed(true, None),
            Err(Fault::Malformed { .. })
        ));
    }

    #[test]
    fn changes_require_the_callers_account() {
        let model = configuration(&[]);
        assert!(model.check_account(Some("123456789012")).is_ok());
        assert!(matches!(
            model.check_account(Some("210987654321")),
            Err(Fault::InvalidInput { .. })
        ));
        assert!(matches!(
            model.check_account(None),
            Err(Fault::InvalidInput { .. })
        ));
    }

    #[test]
    fn request_account_becomes_the_identifier() {
        let mut model = AccountAuditConfiguration::default();
        model.adopt_account("123456789012");
        assert_eq!(Some("123456789012"), model.identifier());
        assert!(model.check_account(model.caller_account_id.as_deref()).is_ok());

        let mut other = configuration(&[]);
        other.adopt_account("210987654321");
        assert_eq!(Some("123456789012"), other.identifier());
        assert!(other
            .check_account(other.caller_account_id.as_deref())
            .is_err());
    }

    #[test]
    fn sentinel_is_the_role_arn() {
        assert!(configuration(&[]).sentinel_present());
        assert!(!AccountAuditConfiguration::default().sentinel_present());
        let empty = AccountAuditConfiguration {
            role_arn: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty.sentinel_present());
    }
}
