//! Remote faults and their classification.
//!
//! Every call against a remote API either succeeds or fails with one of a
//! fixed set of named conditions, a [`Fault`]. The reconciler classifies a
//! fault exactly once into a [`HandlerErrorCode`], which is what the
//! provisioning framework sees.

/// A named fault condition raised by a remote call.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Fault {
    #[snafu(display("Resource not found: {message}"))]
    NotFound { message: String },

    #[snafu(display("Resource already exists: {message}"))]
    AlreadyExists { message: String },

    #[snafu(display("Invalid input: {message}"))]
    InvalidInput { message: String },

    #[snafu(display("Not authorized: {message}"))]
    Unauthorized { message: String },

    #[snafu(display("Internal failure: {message}"))]
    Internal { message: String },

    #[snafu(display("Service unavailable: {message}"))]
    Unavailable { message: String },

    #[snafu(display("Throttled: {message}"))]
    Throttled { message: String },

    #[snafu(display("Conflicting update: {message}"))]
    Conflict { message: String },

    #[snafu(display("Limit exceeded: {message}"))]
    LimitExceeded { message: String },

    #[snafu(display("Version conflict: {message}"))]
    VersionConflict { message: String },

    #[snafu(display("Malformed response: {}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join(" -> ")))]
    Malformed { source: anyhow::Error },

    #[snafu(display("Unclassified fault ({}): {message}", code.as_deref().unwrap_or("no code")))]
    Unclassified {
        code: Option<String>,
        message: String,
    },
}

impl From<anyhow::Error> for Fault {
    fn from(source: anyhow::Error) -> Self {
        Fault::Malformed { source }
    }
}

impl Fault {
    /// Builds a fault from a remote error code, like `ResourceNotFoundException`.
    ///
    /// Unknown codes, and errors without a code at all (timeouts, dispatch
    /// failures), are [`Fault::Unclassified`].
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some("ResourceNotFoundException" | "NotFoundException") => Fault::NotFound { message },
            Some("ResourceAlreadyExistsException" | "AlreadyExistsException") => {
                Fault::AlreadyExists { message }
            }
            Some(
                "InvalidRequestException"
                | "InvalidQueryException"
                | "InvalidAggregationException"
                | "MalformedPolicyException"
                | "CertificateValidationException"
                | "ValidationException",
            ) => Fault::InvalidInput { message },
            Some("UnauthorizedException" | "AccessDeniedException") => {
                Fault::Unauthorized { message }
            }
            Some("InternalFailureException" | "InternalException" | "InternalServerException") => {
                Fault::Internal { message }
            }
            Some("ServiceUnavailableException") => Fault::Unavailable { message },
            Some("ThrottlingException" | "TooManyRequestsException") => Fault::Throttled { message },
            Some(
                "ConflictingResourceUpdateException"
                | "DeleteConflictException"
                | "ConflictException"
                | "ResourceConflictException",
            ) => Fault::Conflict { message },
            Some(
                "LimitExceededException"
                | "ServiceQuotaExceededException"
                | "VersionsLimitExceededException",
            ) => {
                Fault::LimitExceeded { message }
            }
            Some("VersionConflictException") => Fault::VersionConflict { message },
            other => Fault::Unclassified {
                code: other.map(str::to_owned),
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Fault::NotFound { .. })
    }

    /// Maps this fault onto the handler error taxonomy.
    pub fn classify(&self) -> HandlerErrorCode {
        match self {
            Fault::NotFound { .. } => HandlerErrorCode::NotFound,
            Fault::AlreadyExists { .. } => HandlerErrorCode::AlreadyExists,
            Fault::InvalidInput { .. } => HandlerErrorCode::InvalidRequest,
            Fault::Unauthorized { .. } => HandlerErrorCode::AccessDenied,
            Fault::LimitExceeded { .. } => HandlerErrorCode::ServiceLimitExceeded,
            Fault::Conflict { .. } | Fault::VersionConflict { .. } => {
                HandlerErrorCode::ResourceConflict
            }
            Fault::Throttled { .. } => HandlerErrorCode::Throttling,
            Fault::Internal { .. }
            | Fault::Unavailable { .. }
            | Fault::Malformed { .. }
            | Fault::Unclassified { .. } => HandlerErrorCode::ServiceInternalError,
        }
    }

    /// Whether this fault was not recognized as any named condition.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Fault::Malformed { .. } | Fault::Unclassified { .. })
    }
}

/// Error codes reported to the provisioning framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HandlerErrorCode {
    InvalidRequest,
    AlreadyExists,
    NotFound,
    AccessDenied,
    ServiceLimitExceeded,
    ResourceConflict,
    Throttling,
    ServiceInternalError,
}

impl HandlerErrorCode {
    /// Whether the framework may retry the invocation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HandlerErrorCode::Throttling | HandlerErrorCode::ServiceInternalError
        )
    }
}

impl core::fmt::Display for HandlerErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_classify_into_the_taxonomy() {
        let table = [
            ("ResourceNotFoundException", HandlerErrorCode::NotFound),
            ("ResourceAlreadyExistsException", HandlerErrorCode::AlreadyExists),
            ("InvalidRequestException", HandlerErrorCode::InvalidRequest),
            ("UnauthorizedException", HandlerErrorCode::AccessDenied),
            ("LimitExceededException", HandlerErrorCode::ServiceLimitExceeded),
            ("VersionsLimitExceededException", HandlerErrorCode::ServiceLimitExceeded),
            ("ConflictingResourceUpdateException", HandlerErrorCode::ResourceConflict),
            ("DeleteConflictException", HandlerErrorCode::ResourceConflict),
            ("VersionConflictException", HandlerErrorCode::ResourceConflict),
            ("ThrottlingException", HandlerErrorCode::Throttling),
            ("InternalFailureException", HandlerErrorCode::ServiceInternalError),
            ("ServiceUnavailableException", HandlerErrorCode::ServiceInternalError),
        ];
        for (code, expected) in table {
            let fault = Fault::from_code(Some(code), "boom");
            assert_eq!(expected, fault.classify(), "{code}");
            assert!(!fault.is_unexpected(), "{code}");
        }
    }

    #[test]
    fn unknown_faults_are_internal_errors() {
        let fault = Fault::from_code(Some("SomethingNewException"), "boom");
        assert!(fault.is_unexpected());
        assert_eq!(HandlerErrorCode::ServiceInternalError, fault.classify());
        assert!(fault.to_string().contains("SomethingNewException"));

        let fault = Fault::from_code(None, "dispatch failure");
        assert_eq!(HandlerErrorCode::ServiceInternalError, fault.classify());

        let fault = Fault::from(anyhow::anyhow!("missing arn"));
        assert!(fault.is_unexpected());
        assert_eq!(HandlerErrorCode::ServiceInternalError, fault.classify());
    }

    #[test]
    fn only_throttling_and_internal_errors_are_retryable() {
        assert!(HandlerErrorCode::Throttling.is_retryable());
        assert!(HandlerErrorCode::ServiceInternalError.is_retryable());
        assert!(!HandlerErrorCode::NotFound.is_retryable());
        assert!(!HandlerErrorCode::AlreadyExists.is_retryable());
        assert!(!HandlerErrorCode::ResourceConflict.is_retryable());
    }
}
