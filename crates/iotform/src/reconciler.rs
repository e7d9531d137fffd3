//! The create, read, update, delete and list protocol.
//!
//! Every operation probes the remote first and never relies on state
//! stored by a previous invocation, except for the [`CallbackContext`] the
//! framework hands back when an operation asked to be re-invoked.
use snafu::ResultExt;

use crate::{
    probe::{probe, Existence},
    tags, Action, CallbackContext, DeletePreparation, DeserializeSnafu, Fault, HandlerErrorCode,
    HandlerRequest, ProgressEvent, ReconcilerConfig, Resource, Result, SerializeSnafu, TagService,
};

/// Drives resources of one provider through their lifecycle.
///
/// The provider handle is injected; the reconciler keeps no state between
/// invocations.
pub struct Reconciler<'a, P> {
    provider: &'a P,
    config: ReconcilerConfig,
}

fn display_id<R: Resource>(model: &R) -> &str {
    model.identifier().unwrap_or("<unnamed>")
}

impl<'a, P: TagService> Reconciler<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Reconciler {
            provider,
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn provider(&self) -> &'a P {
        self.provider
    }

    /// Runs one handler invocation.
    pub async fn handle<R>(&self, action: Action, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        log::info!("{action} {}:", R::TYPE_NAME);
        let event = match action {
            Action::Create => self.create(request).await,
            Action::Read => self.read(request).await,
            Action::Update => self.update(request).await,
            Action::Delete => self.delete(request).await,
            Action::List => self.list(request).await,
        };
        match &event {
            ProgressEvent::Failed {
                error_code,
                message,
                ..
            } => log::info!("  {action} {} failed with {error_code}: {message}", R::TYPE_NAME),
            ProgressEvent::InProgress {
                callback_delay_seconds,
                ..
            } => log::info!("  in progress, re-invoke in {callback_delay_seconds}s"),
            _ => log::info!("  success!"),
        }
        event
    }

    /// Decodes a JSON request, runs it and encodes the resulting event.
    pub async fn dispatch_json<R>(&self, action: Action, request: &str) -> Result<String>
    where
        R: Resource<Provider = P>,
    {
        let request: HandlerRequest<R> = serde_json::from_str(request).context(DeserializeSnafu {
            name: format!("{action} {} request", R::TYPE_NAME),
        })?;
        let event = self.handle(action, request).await;
        serde_json::to_string(&event).context(SerializeSnafu {
            name: format!("{action} {} event", R::TYPE_NAME),
        })
    }

    pub async fn create<R>(&self, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        let Some(mut model) = request.desired_resource_state.clone() else {
            return ProgressEvent::failed(
                None,
                HandlerErrorCode::InvalidRequest,
                "Missing desired resource state",
            );
        };

        let read_only = model.read_only_populated();
        if !read_only.is_empty() {
            return ProgressEvent::failed(
                Some(model),
                HandlerErrorCode::InvalidRequest,
                format!("Read-only properties cannot be set: {}", read_only.join(", ")),
            );
        }
        if let Some(account_id) = request.aws_account_id.as_deref() {
            model.adopt_account(account_id);
        }

        if model.identifier().is_none() {
            let Some(max_length) = R::IDENTIFIER_MAX_LENGTH else {
                return ProgressEvent::failed(
                    Some(model),
                    HandlerErrorCode::InvalidRequest,
                    format!("{} requires an identifier", R::TYPE_NAME),
                );
            };
            let identifier = request.generate_identifier(max_length);
            log::info!("  generated identifier '{identifier}'");
            model.set_identifier(identifier);
        }

        let desired_tags = tags::desired(
            model.resource_tags(),
            request.desired_resource_tags.as_ref(),
            request.system_tags.as_ref(),
        );

        match self.try_create(&model, &desired_tags).await {
            Ok(event) => event,
            Err(fault) => ProgressEvent::from_fault(Some(model), &fault),
        }
    }

    async fn try_create<R>(&self, model: &R, desired_tags: &tags::TagSet) -> Result<ProgressEvent<R>, Fault>
    where
        R: Resource<Provider = P>,
    {
        if probe(model, self.provider).await?.is_present() {
            return Ok(ProgressEvent::failed(
                Some(model.clone()),
                HandlerErrorCode::AlreadyExists,
                format!("{} '{}' already exists", R::TYPE_NAME, display_id(model)),
            ));
        }

        log::info!("{} '{}': create", R::TYPE_NAME, display_id(model));
        let created = model.create(self.provider, desired_tags).await?;
        log::info!("  created {} '{}'", R::TYPE_NAME, display_id(&created));
        Ok(ProgressEvent::success(created))
    }

    pub async fn read<R>(&self, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        let Some(mut model) = request
            .desired_resource_state
            .or(request.previous_resource_state)
        else {
            return ProgressEvent::failed(
                None,
                HandlerErrorCode::InvalidRequest,
                "Missing resource state",
            );
        };
        if let Some(account_id) = request.aws_account_id.as_deref() {
            model.adopt_account(account_id);
        }

        match self.try_read(&model).await {
            Ok(event) => event,
            Err(fault) => ProgressEvent::from_fault(Some(model), &fault),
        }
    }

    async fn try_read<R>(&self, model: &R) -> Result<ProgressEvent<R>, Fault>
    where
        R: Resource<Provider = P>,
    {
        let mut observed = match probe(model, self.provider).await? {
            Existence::Present(observed) => observed,
            Existence::Absent => return Ok(not_found(model)),
        };
        if R::TAGGABLE {
            let arn = observed_arn(&observed)?;
            log::debug!("{} '{}': list tags", R::TYPE_NAME, display_id(model));
            let tags = tags::list_all(self.provider, &arn).await?;
            observed.set_resource_tags(tags);
        }
        Ok(ProgressEvent::success(observed))
    }

    pub async fn update<R>(&self, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        let Some(mut model) = request.desired_resource_state.clone() else {
            return ProgressEvent::failed(
                None,
                HandlerErrorCode::InvalidRequest,
                "Missing desired resource state",
            );
        };

        let previous_id = request
            .previous_resource_state
            .as_ref()
            .and_then(|previous| previous.identifier())
            .map(str::to_owned);
        match (model.identifier().map(str::to_owned), previous_id) {
            (None, Some(previous_id)) => model.set_identifier(previous_id),
            (Some(id), Some(previous_id)) if id != previous_id => {
                return ProgressEvent::failed(
                    Some(model),
                    HandlerErrorCode::InvalidRequest,
                    format!("Identifier cannot change from '{previous_id}' to '{id}'"),
                );
            }
            _ => {}
        }
        if let Some(account_id) = request.aws_account_id.as_deref() {
            model.adopt_account(account_id);
        }
        if model.identifier().is_none() {
            return ProgressEvent::failed(
                Some(model),
                HandlerErrorCode::InvalidRequest,
                format!("{} requires an identifier", R::TYPE_NAME),
            );
        }

        let desired_tags = tags::desired(
            model.resource_tags(),
            request.desired_resource_tags.as_ref(),
            request.system_tags.as_ref(),
        );

        match self.try_update(&model, &desired_tags).await {
            Ok(event) => event,
            Err(fault) => ProgressEvent::from_fault(Some(model), &fault),
        }
    }

    async fn try_update<R>(&self, model: &R, desired_tags: &tags::TagSet) -> Result<ProgressEvent<R>, Fault>
    where
        R: Resource<Provider = P>,
    {
        let observed = match probe(model, self.provider).await? {
            Existence::Present(observed) => observed,
            Existence::Absent => return Ok(not_found(model)),
        };

        let cmp = pretty_assertions::Comparison::new(&observed, model);
        let change_string = format!("{cmp}")
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        log::info!("{} '{}': update\n{change_string}", R::TYPE_NAME, display_id(model));
        let mut updated = model.update(self.provider, &observed).await?;

        if R::TAGGABLE {
            let arn = match updated.arn() {
                Some(arn) => arn.to_owned(),
                None => observed_arn(&observed)?,
            };
            let delta = tags::reconcile(self.provider, &arn, desired_tags).await?;
            if delta.is_empty() {
                log::debug!("  tags are up to date");
            }
            updated.set_resource_tags(model.resource_tags().cloned().unwrap_or_default());
        }
        Ok(ProgressEvent::success(updated))
    }

    pub async fn delete<R>(&self, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        let Some(mut model) = request
            .desired_resource_state
            .or(request.previous_resource_state)
        else {
            return ProgressEvent::failed(
                None,
                HandlerErrorCode::InvalidRequest,
                "Missing resource state",
            );
        };
        if let Some(account_id) = request.aws_account_id.as_deref() {
            model.adopt_account(account_id);
        }
        if model.identifier().is_none() {
            return ProgressEvent::failed(
                Some(model),
                HandlerErrorCode::InvalidRequest,
                format!("{} requires an identifier", R::TYPE_NAME),
            );
        }
        let context = request.callback_context.unwrap_or_default();

        match self.try_delete(&model, context).await {
            Ok(event) => event,
            Err(fault) => ProgressEvent::from_fault(Some(model), &fault),
        }
    }

    async fn try_delete<R>(&self, model: &R, mut context: CallbackContext) -> Result<ProgressEvent<R>, Fault>
    where
        R: Resource<Provider = P>,
    {
        let observed = match probe(model, self.provider).await? {
            Existence::Present(observed) => observed,
            Existence::Absent if context.delete_issued => {
                log::info!("  {} '{}' is gone", R::TYPE_NAME, display_id(model));
                return Ok(ProgressEvent::done());
            }
            Existence::Absent => return Ok(not_found(model)),
        };

        if !context.delete_issued {
            match model.prepare_delete(self.provider, &observed, &context).await? {
                DeletePreparation::Ready => {}
                DeletePreparation::Wait { delay_seconds } => {
                    context.waited_seconds = context.waited_seconds.saturating_add(delay_seconds);
                    log::info!(
                        "  {} '{}' cannot be deleted yet, waited {}s so far",
                        R::TYPE_NAME,
                        display_id(model),
                        context.waited_seconds
                    );
                    return Ok(ProgressEvent::in_progress(
                        model.clone(),
                        context,
                        delay_seconds,
                    ));
                }
            }
        }

        log::info!("{} '{}': delete", R::TYPE_NAME, display_id(model));
        match model.delete(self.provider).await {
            Ok(()) => {}
            Err(fault) if fault.is_not_found() && context.delete_issued => {
                log::info!("  {} '{}' was already deleted", R::TYPE_NAME, display_id(model));
                return Ok(ProgressEvent::done());
            }
            Err(fault) => return Err(fault),
        }
        context.delete_issued = true;

        if R::DELETE_STABILIZES && !self.stabilize_delete(model).await {
            context.stabilization_attempts = context.stabilization_attempts.saturating_add(1);
            let stabilization = &self.config.stabilization;
            if context.stabilization_attempts > stabilization.max_reinvocations {
                return Ok(ProgressEvent::failed(
                    Some(model.clone()),
                    HandlerErrorCode::ServiceInternalError,
                    format!(
                        "{} '{}' is still describable after delete",
                        R::TYPE_NAME,
                        display_id(model)
                    ),
                ));
            }
            return Ok(ProgressEvent::in_progress(
                model.clone(),
                context,
                stabilization.reinvocation_delay_seconds,
            ));
        }

        log::info!("  {} '{}' is deleted", R::TYPE_NAME, display_id(model));
        Ok(ProgressEvent::done())
    }

    /// Probes with bounded backoff until the resource is absent. Returns
    /// whether it disappeared within the configured attempts.
    ///
    /// The delete has been issued by now, so a failed describe ends this round
    /// instead of failing the handler.
    async fn stabilize_delete<R>(&self, model: &R) -> bool
    where
        R: Resource<Provider = P>,
    {
        let stabilization = &self.config.stabilization;
        for attempt in 0..stabilization.max_attempts {
            match probe(model, self.provider).await {
                Ok(existence) if !existence.is_present() => return true,
                Ok(_) => {}
                Err(fault) => {
                    log::warn!(
                        "  could not describe {} '{}' after delete: {fault}",
                        R::TYPE_NAME,
                        display_id(model)
                    );
                    return false;
                }
            }
            let delay = stabilization.delay(attempt);
            log::debug!(
                "  {} '{}' still exists, probing again in {delay:?}",
                R::TYPE_NAME,
                display_id(model)
            );
            tokio::time::sleep(delay).await;
        }
        false
    }

    pub async fn list<R>(&self, request: HandlerRequest<R>) -> ProgressEvent<R>
    where
        R: Resource<Provider = P>,
    {
        log::info!("{}: list, token {:?}", R::TYPE_NAME, request.next_token);
        match R::list(
            self.provider,
            request.aws_account_id.as_deref(),
            request.next_token,
        )
        .await
        {
            Ok(page) => ProgressEvent::Listed {
                models: page.models,
                next_token: page.next_token,
            },
            Err(fault) => ProgressEvent::from_fault(None, &fault),
        }
    }
}

fn not_found<R: Resource>(model: &R) -> ProgressEvent<R> {
    ProgressEvent::failed(
        Some(model.clone()),
        HandlerErrorCode::NotFound,
        format!("{} '{}' not found", R::TYPE_NAME, display_id(model)),
    )
}

fn observed_arn<R: Resource>(observed: &R) -> Result<String, Fault> {
    observed.arn().map(str::to_owned).ok_or_else(|| {
        Fault::from(anyhow::anyhow!(
            "{} '{}' was described without an arn",
            R::TYPE_NAME,
            display_id(observed)
        ))
    })
}
