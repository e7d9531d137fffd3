//! Handler requests and the progress events handed back to the framework.
use crate::{identifier, Fault, HandlerErrorCode, TagSet};

/// State carried across re-invocations of the same operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallbackContext {
    /// Seconds spent waiting on delete preconditions so far.
    pub waited_seconds: u32,
    /// Whether the delete call has already been issued.
    pub delete_issued: bool,
    /// Re-invocations spent waiting for a deleted resource to disappear.
    pub stabilization_attempts: u32,
}

/// A single handler invocation as issued by the provisioning framework.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRequest<M> {
    pub desired_resource_state: Option<M>,
    pub previous_resource_state: Option<M>,
    pub stack_id: Option<String>,
    pub logical_resource_identifier: Option<String>,
    /// The account the invocation acts in.
    pub aws_account_id: Option<String>,
    #[serde(default)]
    pub client_request_token: String,
    /// Stack-level and resource-level tags.
    pub desired_resource_tags: Option<TagSet>,
    pub system_tags: Option<TagSet>,
    pub next_token: Option<String>,
    pub callback_context: Option<CallbackContext>,
}

impl<M> Default for HandlerRequest<M> {
    fn default() -> Self {
        HandlerRequest {
            desired_resource_state: None,
            previous_resource_state: None,
            stack_id: None,
            logical_resource_identifier: None,
            aws_account_id: None,
            client_request_token: String::new(),
            desired_resource_tags: None,
            system_tags: None,
            next_token: None,
            callback_context: None,
        }
    }
}

impl<M> HandlerRequest<M> {
    pub fn new(desired: M) -> Self {
        HandlerRequest {
            desired_resource_state: Some(desired),
            ..Default::default()
        }
    }

    pub fn with_previous(mut self, previous: M) -> Self {
        self.previous_resource_state = Some(previous);
        self
    }

    pub fn with_stack(
        mut self,
        stack_id: impl Into<String>,
        logical_resource_identifier: impl Into<String>,
        client_request_token: impl Into<String>,
    ) -> Self {
        self.stack_id = Some(stack_id.into());
        self.logical_resource_identifier = Some(logical_resource_identifier.into());
        self.client_request_token = client_request_token.into();
        self
    }

    pub fn with_account(mut self, aws_account_id: impl Into<String>) -> Self {
        self.aws_account_id = Some(aws_account_id.into());
        self
    }

    pub fn with_desired_tags(mut self, tags: TagSet) -> Self {
        self.desired_resource_tags = Some(tags);
        self
    }

    pub fn with_system_tags(mut self, tags: TagSet) -> Self {
        self.system_tags = Some(tags);
        self
    }

    pub fn with_callback_context(mut self, context: CallbackContext) -> Self {
        self.callback_context = Some(context);
        self
    }

    /// Generates an identifier for this request. Retries of the same request
    /// generate the same identifier.
    pub fn generate_identifier(&self, max_length: usize) -> String {
        identifier::generate(
            self.stack_id.as_deref(),
            self.logical_resource_identifier.as_deref(),
            &self.client_request_token,
            max_length,
        )
    }
}

/// The outcome of one handler invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "status")]
pub enum ProgressEvent<M> {
    #[serde(rename = "SUCCESS", rename_all = "camelCase")]
    Success {
        #[serde(rename = "resourceModel", skip_serializing_if = "Option::is_none")]
        model: Option<M>,
    },
    #[serde(rename = "SUCCESS", rename_all = "camelCase")]
    Listed {
        #[serde(rename = "resourceModels")]
        models: Vec<M>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_token: Option<String>,
    },
    #[serde(rename = "FAILED", rename_all = "camelCase")]
    Failed {
        #[serde(rename = "resourceModel", skip_serializing_if = "Option::is_none")]
        model: Option<M>,
        error_code: HandlerErrorCode,
        message: String,
    },
    #[serde(rename = "IN_PROGRESS", rename_all = "camelCase")]
    InProgress {
        #[serde(rename = "resourceModel")]
        model: M,
        callback_context: CallbackContext,
        callback_delay_seconds: u32,
    },
}

impl<M> ProgressEvent<M> {
    pub fn success(model: M) -> Self {
        ProgressEvent::Success { model: Some(model) }
    }

    /// Success without a model, as reported by delete.
    pub fn done() -> Self {
        ProgressEvent::Success { model: None }
    }

    pub fn failed(model: Option<M>, error_code: HandlerErrorCode, message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            model,
            error_code,
            message: message.into(),
        }
    }

    /// Classifies a fault into a failure.
    pub fn from_fault(model: Option<M>, fault: &Fault) -> Self {
        let error_code = fault.classify();
        if fault.is_unexpected() {
            log::error!("unexpected fault, reporting {error_code}: {fault:?}");
        } else {
            log::info!("  failed with {error_code}: {fault}");
        }
        ProgressEvent::failed(model, error_code, fault.to_string())
    }

    pub fn in_progress(model: M, callback_context: CallbackContext, delay_seconds: u32) -> Self {
        ProgressEvent::InProgress {
            model,
            callback_context,
            callback_delay_seconds: delay_seconds,
        }
    }

    /// The error code of a failure.
    pub fn error_code(&self) -> Option<HandlerErrorCode> {
        match self {
            ProgressEvent::Failed { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Success { .. } | ProgressEvent::Listed { .. }
        )
    }

    /// The model carried by this event, if any.
    pub fn model(&self) -> Option<&M> {
        match self {
            ProgressEvent::Success { model } | ProgressEvent::Failed { model, .. } => {
                model.as_ref()
            }
            ProgressEvent::InProgress { model, .. } => Some(model),
            ProgressEvent::Listed { .. } => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn events_serialize_with_status_tags() {
        let event = ProgressEvent::<serde_json::Value>::failed(
            None,
            HandlerErrorCode::NotFound,
            "gone",
        );
        assert_eq!(
            serde_json::json!({
                "status": "FAILED",
                "errorCode": "NotFound",
                "message": "gone",
            }),
            serde_json::to_value(&event).unwrap()
        );

        let event = ProgressEvent::in_progress(
            serde_json::json!({ "Name": "a" }),
            CallbackContext {
                waited_seconds: 60,
                ..Default::default()
            },
            240,
        );
        assert_eq!(
            serde_json::json!({
                "status": "IN_PROGRESS",
                "resourceModel": { "Name": "a" },
                "callbackContext": {
                    "waitedSeconds": 60,
                    "deleteIssued": false,
                    "stabilizationAttempts": 0,
                },
                "callbackDelaySeconds": 240,
            }),
            serde_json::to_value(&event).unwrap()
        );

        let event = ProgressEvent::Listed {
            models: vec![serde_json::json!({ "Name": "a" })],
            next_token: Some("t".to_owned()),
        };
        assert_eq!(
            serde_json::json!({
                "status": "SUCCESS",
                "resourceModels": [{ "Name": "a" }],
                "nextToken": "t",
            }),
            serde_json::to_value(&event).unwrap()
        );
    }

    #[test]
    fn requests_deserialize_from_camel_case() {
        let request: HandlerRequest<serde_json::Value> = serde_json::from_str(
            r#"{
                "desiredResourceState": { "Name": "a" },
                "stackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/guid",
                "logicalResourceIdentifier": "MyResource",
                "awsAccountId": "123456789012",
                "clientRequestToken": "token",
                "desiredResourceTags": { "team": "iot" },
                "callbackContext": { "waitedSeconds": 120 }
            }"#,
        )
        .unwrap();
        assert_eq!(Some(serde_json::json!({ "Name": "a" })), request.desired_resource_state);
        assert_eq!(
            Some(&"iot".to_owned()),
            request
                .desired_resource_tags
                .as_ref()
                .and_then(|tags| tags.as_map().get("team"))
        );
        assert!(request.system_tags.is_none());
        assert_eq!(Some("123456789012"), request.aws_account_id.as_deref());
        assert_eq!(120, request.callback_context.unwrap_or_default().waited_seconds);
        assert!(request.generate_identifier(128).starts_with("my-stack-MyResource-"));
    }
}
