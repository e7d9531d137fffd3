//! # Iotform
//!
//! Iotform is a library for writing CloudFormation-style resource handlers
//! (create, read, update, delete and list) over remote control-plane APIs.
//! It ships the one piece of logic every such handler repeats, the
//! reconciliation protocol, along with adapters for a handful of AWS IoT
//! resources built on top of it.
//!
//! ## Concepts
//!
//! Iotform operates on the desired and observed states of resources:
//!
//! - **Desired State**: the resource model handed to a handler by the
//!   provisioning framework. It is never mutated by this library.
//! - **Observed State**: the resource as it currently exists on the remote
//!   service. It is fetched fresh on every invocation and never cached, so
//!   changes made out of band are always seen.
//!
//! A [`Reconciler`] drives a [`Resource`] through its lifecycle:
//!
//! - the [`probe`] module decides whether the resource exists, either
//!   by a not-found fault or by an empty sentinel field,
//! - the remote mutation is issued,
//! - tags are reconciled against the live tag listing with the minimal set
//!   of attach and detach calls (see [`tags`]),
//! - every remote [`Fault`] is classified into a [`HandlerErrorCode`] and
//!   reported back as a [`ProgressEvent`].
//!
//! ## Error Handling
//!
//! Remote failures never escape as Rust errors; they are classified and
//! returned as [`ProgressEvent::Failed`]. Errors that happen outside of the
//! protocol, like a request that cannot be decoded, are reported with the
//! crate [`Error`] enum.

use std::future::Future;

pub mod aws;
pub mod config;
pub mod fault;
pub mod identifier;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod reconciler;
pub mod tags;

pub use config::{ReconcilerConfig, StabilizationConfig};
pub use fault::{Fault, HandlerErrorCode};
pub use probe::{Existence, ExistenceStrategy};
pub use progress::{CallbackContext, HandlerRequest, ProgressEvent};
pub use reconciler::Reconciler;
pub use tags::{TagDelta, TagService, TagSet};

/// Top-level error enum for failures outside of the reconciliation protocol.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Could not serialize '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not deserialize '{name}': {source}"))]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },
}

type Result<T, E = Error> = core::result::Result<T, E>;

/// One page of a list call.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<M> {
    pub models: Vec<M>,
    pub next_token: Option<String>,
}

/// What has to happen before a resource may be deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePreparation {
    /// The delete call may be issued now.
    Ready,
    /// The remote API enforces a wait. The handler reports `InProgress` and
    /// is invoked again after `delay_seconds`.
    Wait { delay_seconds: u32 },
}

/// Remote resources.
///
/// A `Resource` is the resource model of one remote resource type, together
/// with the calls that move it through its lifecycle. The [`Reconciler`]
/// owns the protocol; implementors only translate between the model and
/// the remote API.
pub trait Resource:
    core::fmt::Debug + Clone + PartialEq + serde::Serialize + serde::de::DeserializeOwned + 'static
{
    /// Handle to the remote API.
    ///
    /// For example [`aws::Iot`] in the case of AWS IoT.
    type Provider: TagService;

    /// Resource type name, used in logs and failure messages.
    const TYPE_NAME: &'static str;

    /// How the existence of this resource type is detected.
    const EXISTENCE: ExistenceStrategy = ExistenceStrategy::NotFoundFault;

    /// Maximum length of a generated identifier.
    ///
    /// `None` means identifiers are never generated and must be supplied.
    const IDENTIFIER_MAX_LENGTH: Option<usize> = None;

    /// Whether tags are reconciled through the provider's [`TagService`].
    const TAGGABLE: bool = false;

    /// Whether the resource may still be describable for a while after the
    /// delete call returns.
    const DELETE_STABILIZES: bool = false;

    /// The primary identifier, if set.
    fn identifier(&self) -> Option<&str>;

    fn set_identifier(&mut self, identifier: String);

    /// Names of read-only properties that carry a value.
    fn read_only_populated(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Whether the sentinel field is populated.
    ///
    /// Only consulted for [`ExistenceStrategy::SentinelField`].
    fn sentinel_present(&self) -> bool {
        true
    }

    /// The ARN tag calls are addressed to.
    fn arn(&self) -> Option<&str> {
        None
    }

    /// Tags declared on the model itself.
    fn resource_tags(&self) -> Option<&TagSet> {
        None
    }

    fn set_resource_tags(&mut self, _tags: TagSet) {}

    /// Adopts the account the invocation acts in.
    ///
    /// Per-account singletons take it as their identifier when none is set.
    fn adopt_account(&mut self, _account_id: &str) {}

    /// Reads the current state of the resource from the platform.
    ///
    /// Resources using [`ExistenceStrategy::NotFoundFault`] must fail with
    /// [`Fault::NotFound`] when the resource does not exist.
    fn describe(&self, provider: &Self::Provider) -> impl Future<Output = Result<Self, Fault>>;

    /// Creates the resource with the given tags, returning the model with
    /// server-assigned fields filled in.
    fn create(
        &self,
        provider: &Self::Provider,
        tags: &TagSet,
    ) -> impl Future<Output = Result<Self, Fault>>;

    /// Updates the resource. Tags are reconciled separately.
    fn update(
        &self,
        provider: &Self::Provider,
        observed: &Self,
    ) -> impl Future<Output = Result<Self, Fault>>;

    fn delete(&self, provider: &Self::Provider) -> impl Future<Output = Result<(), Fault>>;

    /// Brings the resource into a deletable state.
    fn prepare_delete(
        &self,
        _provider: &Self::Provider,
        _observed: &Self,
        _context: &CallbackContext,
    ) -> impl Future<Output = Result<DeletePreparation, Fault>> {
        async { Ok::<_, Fault>(DeletePreparation::Ready) }
    }

    /// Lists one page of resources, as models holding identifying fields only.
    fn list(
        provider: &Self::Provider,
        account_id: Option<&str>,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<Page<Self>, Fault>>;
}

/// The handler operation being invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::List => "list",
        })
    }
}
