//! Material selection session
//!
//! One [`CdMaterialSession`] backs one open trigger view. It owns:
//! - the material list and every flag derived from it
//! - the fetcher with its fetch and page cancellation scopes
//! - the trigger controller with its deploy scope
//!
//! State sits behind a mutex that is never held across an await point.
//! Derived values (selected material, passing-filters flag, partition) are
//! recomputed from the list on demand and never stored.

use crate::config::ConsoleConfig;
use crate::config_diff::{ConfigDiffKey, ConfigDiffSnapshot};
use crate::error::{FetchError, MissingIds, ServiceError, SessionError, TriggerError};
use crate::features::OptionalFeatures;
use crate::fetcher::{older_page_toast, Companions, FetchParams, InitialLoad, MaterialFetcher, OlderPage};
use crate::notify::Toast;
use crate::presentation::{
    self, DeployButton, DeployButtonInput, EmptyState, EmptyStateInput, MaterialCard,
};
use crate::query::{config_to_deploy_value, initial_config_to_deploy, TriggerQuery, ViewMode, PARAM_DEPLOY};
use crate::reconciler::{self, apply_handoff, BulkHandoff, HandoffOutcome, SelectOutcome};
use crate::services::{
    BulkAggregator, ConfigDiffService, DeployService, MaterialService, Navigator, Notifier,
};
use crate::trigger::{
    DeployResult, TriggerController, TriggerGate, TriggerOutcome, TriggerPhase,
    RESOLVE_ERRORS_MESSAGE,
};
use crate::types::{
    DeployConfigOption, DeployRequest, DeploymentWindow, ManifestRequest, MaterialType,
    MaterialsPage, PipelineTarget, PolicyConsequences, RuntimeParam, RuntimeParamsErrorState,
};
use cdm_material::{
    can_expire_approval, select_by_tag, CtaContext, FilterTabs, FilterView, Material, MaterialList,
    PartitionContext,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators every session needs, plus the optional bulk and diff ones
#[derive(Clone)]
pub struct SessionServices {
    pub materials: Arc<dyn MaterialService>,
    pub deploy: Arc<dyn DeployService>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub config_diff: Option<Arc<dyn ConfigDiffService>>,
    pub bulk: Option<Arc<dyn BulkAggregator>>,
}

impl SessionServices {
    #[must_use]
    pub fn new(
        materials: Arc<dyn MaterialService>,
        deploy: Arc<dyn DeployService>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            materials,
            deploy,
            notifier,
            navigator,
            config_diff: None,
            bulk: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_config_diff(mut self, service: Arc<dyn ConfigDiffService>) -> Self {
        self.config_diff = Some(service);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_bulk(mut self, aggregator: Arc<dyn BulkAggregator>) -> Self {
        self.bulk = Some(aggregator);
        self
    }
}

/// State of the material list as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Full-view error screen with retry
    Failed { message: String },
    /// Policy consequences block this stage
    TriggerBlocked,
}

/// Partition as ids, for callers that cannot borrow the list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    pub consumed: Vec<u64>,
    pub eligible: Vec<u64>,
    pub eligible_count: usize,
    /// Present only when resource filters are configured
    pub tabs: Option<FilterTabs>,
}

#[derive(Debug, Default)]
struct SessionState {
    list: MaterialList,
    status: LoadStatus,
    total_count: usize,
    no_more_images: bool,
    /// Last first-page response with its materials moved into `list`
    meta: MaterialsPage,
    runtime_params: Vec<RuntimeParam>,
    runtime_params_errors: RuntimeParamsErrorState,
    window: Option<DeploymentWindow>,
    policy: Option<PolicyConsequences>,
    search: Option<String>,
    filter_view: FilterView,
    edit_mode: BTreeMap<usize, bool>,
    is_rollback_trigger: bool,
    is_select_image_trigger: bool,
    config_to_deploy: DeployConfigOption,
    query: TriggerQuery,
    config_diff: ConfigDiffSnapshot,
    pending_handoff: Option<BulkHandoff>,
}

impl SessionState {
    fn partition_context(&self) -> PartitionContext {
        PartitionContext::default()
            .approval_configured(self.meta.is_approval_configured())
            .with_exception_user(self.meta.is_exception_user)
            .with_view(self.filter_view)
            .with_search(self.search.is_some())
            .with_resource_filters(!self.meta.resource_filters.is_empty())
    }

    /// Re-run the partition so unapproved materials lose their selection
    fn repartition(&mut self) -> HashSet<usize> {
        let ctx = self.partition_context();
        self.list
            .partition(&ctx)
            .consumed
            .iter()
            .map(|m| m.index)
            .collect()
    }

    fn cta_context(&self, consumed: bool) -> CtaContext {
        CtaContext {
            in_consumed_group: consumed,
            can_approver_deploy: self.meta.can_approver_deploy,
        }
    }

    fn gate(&self) -> TriggerGate<'_> {
        let derived = reconciler::derive(&self.list);
        TriggerGate {
            selected: derived.selected,
            are_materials_passing_filters: derived.are_materials_passing_filters,
            is_rollback_trigger: self.is_rollback_trigger,
            config_to_deploy: self.config_to_deploy,
            config_diff: &self.config_diff,
            can_approver_deploy: self.meta.can_approver_deploy,
            trigger_blocked: self.status == LoadStatus::TriggerBlocked,
        }
    }

    fn constrained_mode(&self) -> bool {
        self.is_rollback_trigger || self.is_select_image_trigger
    }
}

pub struct CdMaterialSession {
    target: PipelineTarget,
    config: ConsoleConfig,
    features: OptionalFeatures,
    services: SessionServices,
    fetcher: MaterialFetcher,
    trigger: TriggerController,
    state: Mutex<SessionState>,
    generation: AtomicU64,
}

enum LoadStep {
    Done,
    SearchFor(String),
}

impl CdMaterialSession {
    #[must_use]
    pub fn new(
        target: PipelineTarget,
        config: ConsoleConfig,
        features: OptionalFeatures,
        services: SessionServices,
    ) -> Self {
        let fetcher = MaterialFetcher::new(Arc::clone(&services.materials), config.page_size)
            .with_window_service(features.deployment_window_service.clone())
            .with_policy_service(features.policy_consequences.clone());

        let material_type = target.material_type;
        let query = TriggerQuery::new();
        let state = SessionState {
            is_rollback_trigger: material_type.is_rollback(),
            is_select_image_trigger: material_type == MaterialType::None,
            config_to_deploy: initial_config_to_deploy(material_type, &query),
            query,
            ..SessionState::default()
        };

        Self {
            target,
            config,
            features,
            services,
            fetcher,
            trigger: TriggerController::new(),
            state: Mutex::new(state),
            generation: AtomicU64::new(0),
        }
    }

    /// Seed search text and config option from the current route
    #[must_use]
    pub fn with_query(self, query: TriggerQuery) -> Self {
        {
            let mut state = self.state.lock();
            state.search = query.search().map(str::to_string);
            state.config_to_deploy = initial_config_to_deploy(self.target.material_type, &query);
            state.query = query;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> &PipelineTarget {
        &self.target
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn features(&self) -> &OptionalFeatures {
        &self.features
    }

    fn fetch_params(&self, state: &SessionState) -> Result<FetchParams, FetchError> {
        let pipeline_id = self.target.pipeline_id.ok_or(FetchError::MissingPipeline)?;
        Ok(FetchParams {
            pipeline_id,
            stage_type: self.target.stage_type,
            list_kind: self.target.material_type.list_kind(),
            search: state.search.clone(),
        })
    }

    fn companions(&self) -> Companions {
        Companions {
            app_id: self.target.app_id.unwrap_or_default(),
            env_id: self.target.env_id,
            skip_window: self.target.is_from_bulk_cd,
        }
    }

    fn publish_to_bulk(&self, materials: Option<Vec<Material>>) {
        if let (Some(bulk), Some(materials)) = (&self.services.bulk, materials) {
            bulk.update_materials(&materials);
        }
    }

    fn bulk_snapshot(&self, state: &SessionState) -> Option<Vec<Material>> {
        self.services
            .bulk
            .as_ref()
            .map(|_| state.list.as_slice().to_vec())
    }

    /// Load the first page for the current identity
    ///
    /// Supersedes any outstanding first-page or older-page request. A bulk
    /// hand-off whose image is not in the first page triggers exactly one
    /// follow-up search for it.
    ///
    /// # Errors
    /// [`SessionError::Fetch`]; an aborted error means this load was
    /// superseded and left the state untouched.
    pub async fn load(&self) -> Result<(), SessionError> {
        let mut searched = false;
        loop {
            let (params, generation) = {
                let mut state = self.state.lock();
                let params = self.fetch_params(&state)?;
                state.status = LoadStatus::Loading;
                (params, self.generation.fetch_add(1, Ordering::AcqRel) + 1)
            };

            let result = self.fetcher.load_first_page(&params, self.companions()).await;

            if self.generation.load(Ordering::Acquire) != generation {
                debug!(generation, "discarding superseded material load");
                return Err(FetchError::Service(ServiceError::Aborted).into());
            }

            let step = match result {
                Err(err) if err.is_aborted() => return Err(err.into()),
                Err(err) => {
                    self.state.lock().status = LoadStatus::Failed {
                        message: err.to_string(),
                    };
                    return Err(err.into());
                }
                Ok(InitialLoad::TriggerBlocked { policy }) => {
                    let mut state = self.state.lock();
                    state.list = MaterialList::default();
                    state.total_count = 0;
                    state.no_more_images = true;
                    state.policy = Some(policy);
                    state.status = LoadStatus::TriggerBlocked;
                    return Ok(());
                }
                Ok(InitialLoad::Loaded {
                    page,
                    window,
                    policy,
                }) => self.apply_first_page(page, window, policy, searched),
            };

            match step {
                LoadStep::Done => break,
                LoadStep::SearchFor(image) => {
                    info!(image = %image, "searching for bulk-selected image");
                    searched = true;
                    let query = {
                        let mut state = self.state.lock();
                        state.search = Some(image.clone());
                        state.query = state.query.clone().with_search(Some(&image));
                        state.query.clone()
                    };
                    self.services.navigator.push_query(&query);
                }
            }
        }

        self.sync_config_diff().await;
        Ok(())
    }

    fn apply_first_page(
        &self,
        mut page: MaterialsPage,
        window: Option<DeploymentWindow>,
        policy: Option<PolicyConsequences>,
        searched: bool,
    ) -> LoadStep {
        let mut state = self.state.lock();
        state.list = MaterialList::new(std::mem::take(&mut page.materials));
        state.total_count = page.total_count;
        state.no_more_images = state.list.len() >= page.total_count;
        state.runtime_params.clone_from(&page.runtime_params);
        state.runtime_params_errors = RuntimeParamsErrorState::default();
        state.meta = page;
        state.window = window;
        state.policy = policy;
        state.edit_mode.clear();
        state.status = LoadStatus::Loaded;

        let mut step = LoadStep::Done;
        if let Some(handoff) = state.pending_handoff.take() {
            match apply_handoff(&mut state.list, &handoff) {
                HandoffOutcome::NeedsSearch(image) if !searched => {
                    state.pending_handoff = Some(handoff);
                    step = LoadStep::SearchFor(image);
                }
                HandoffOutcome::NeedsSearch(image) => {
                    warn!(image = %image, "bulk-selected image not found");
                }
                HandoffOutcome::Selected(_) | HandoffOutcome::Cleared => {}
            }
        }
        state.repartition();
        let snapshot = self.bulk_snapshot(&state);
        drop(state);

        if matches!(step, LoadStep::Done) {
            self.publish_to_bulk(snapshot);
        }
        step
    }

    /// Change the search text and reload
    ///
    /// # Errors
    /// As [`Self::load`].
    pub async fn set_search(&self, search: Option<&str>) -> Result<(), SessionError> {
        let query = {
            let mut state = self.state.lock();
            state.query = state.query.clone().with_search(search);
            state.search = state.query.search().map(str::to_string);
            state.query.clone()
        };
        self.services.navigator.push_query(&query);
        self.load().await
    }

    /// Explicit refresh
    ///
    /// # Errors
    /// As [`Self::load`].
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.load().await
    }

    /// Append the next older page
    ///
    /// Returns how many materials were appended; `0` when another older-page
    /// request is already outstanding or there is nothing left to load.
    ///
    /// # Errors
    /// [`SessionError::NotLoaded`] before a successful first load, and
    /// fetch errors. Non-aborted failures are also shown through the
    /// global error presenter.
    pub async fn load_older(&self) -> Result<usize, SessionError> {
        let (params, offset) = {
            let state = self.state.lock();
            if state.status != LoadStatus::Loaded {
                return Err(SessionError::NotLoaded);
            }
            if state.no_more_images {
                return Ok(0);
            }
            (self.fetch_params(&state)?, state.list.older_page_offset())
        };

        let page = match self.fetcher.load_older(&params, offset).await {
            Ok(OlderPage::Busy) => return Ok(0),
            Ok(OlderPage::Fetched(page)) => page,
            Err(err) => {
                if let FetchError::Service(service) = &err {
                    if !service.is_aborted() {
                        self.services.notifier.show_error(service);
                    }
                }
                return Err(err.into());
            }
        };

        let (toast, appended, snapshot) = {
            let mut state = self.state.lock();
            let filters_present = !state.meta.resource_filters.is_empty();
            let search_applied = state.search.is_some();
            let view = state.filter_view;

            let added = state.list.append_older(page.materials);
            let toast = older_page_toast(added, filters_present, search_applied, view);
            let appended = added.len();

            state.total_count = page.total_count;
            state.no_more_images = state.list.len() >= page.total_count;
            state.repartition();
            (toast, appended, self.bulk_snapshot(&state))
        };

        info!(appended, offset, "older materials appended");
        self.services.notifier.notify(toast);
        self.publish_to_bulk(snapshot);
        Ok(appended)
    }

    /// Select the material at `index`
    ///
    /// # Errors
    /// [`SessionError::NotSelectable`] when the card's CTA is not
    /// interactive, [`SessionError::List`] for unknown indices.
    pub async fn select(&self, index: usize) -> Result<SelectOutcome, SessionError> {
        let (outcome, snapshot) = {
            let mut state = self.state.lock();
            let consumed = state.repartition();
            let ctx = state.cta_context(consumed.contains(&index));
            let constrained = state.constrained_mode();
            let outcome = reconciler::select(&mut state.list, index, &ctx, constrained)?;
            state.repartition();
            (outcome, self.bulk_snapshot(&state))
        };

        debug!(index, image = %outcome.image, track = outcome.track_config, "material selected");
        self.publish_to_bulk(snapshot);
        if outcome.track_config {
            self.sync_config_diff().await;
        }
        Ok(outcome)
    }

    /// Queue a bulk-flow selection, applied on the next load
    pub fn set_bulk_handoff(&self, handoff: BulkHandoff) {
        self.state.lock().pending_handoff = Some(handoff);
    }

    /// Select by release tag or pseudo-tag, returning the tag warning
    pub fn select_tag(&self, tag: &str) -> Option<String> {
        let (warning, snapshot) = {
            let mut state = self.state.lock();
            let selection = select_by_tag(tag, state.list.as_slice());
            state.list = MaterialList::new(selection.materials);
            state.repartition();
            (selection.warning, self.bulk_snapshot(&state))
        };
        self.publish_to_bulk(snapshot);
        warning
    }

    pub fn set_filter_view(&self, view: FilterView) {
        let mut state = self.state.lock();
        state.filter_view = view;
        state.repartition();
    }

    /// Flip the edit mode of one card, returning the new value
    pub fn toggle_edit_mode(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        let entry = state.edit_mode.entry(index).or_insert(false);
        *entry = !*entry;
        *entry
    }

    #[must_use]
    pub fn is_in_edit_mode(&self, index: usize) -> bool {
        self.state.lock().edit_mode.get(&index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn partition_summary(&self) -> PartitionSummary {
        let mut state = self.state.lock();
        let ctx = state.partition_context();
        let partition = state.list.partition(&ctx);
        PartitionSummary {
            consumed: partition.consumed.iter().map(|m| m.id).collect(),
            eligible: partition.eligible.iter().map(|m| m.id).collect(),
            eligible_count: partition.eligible_count,
            tabs: ctx.resource_filters_present.then(|| partition.filter_tabs()),
        }
    }

    /// Card presentation for the material at `index`
    #[must_use]
    pub fn card(&self, index: usize) -> Option<MaterialCard> {
        let mut state = self.state.lock();
        let consumed = state.repartition();
        let ctx = state.cta_context(consumed.contains(&index));
        let selectable_list = self.target.material_type != MaterialType::None;
        let requested_user_id = state.meta.requested_user_id;
        let in_edit_mode = state.edit_mode.get(&index).copied().unwrap_or(false);
        let mat = state.list.get(index)?;
        let cta = cdm_material::material_cta(mat, &ctx);

        let approval_info = self.features.approval_info_tippy.as_ref().and_then(|_| {
            mat.user_approval_metadata.as_ref().map(|record| {
                record
                    .approved_users_data
                    .iter()
                    .map(|u| u.user_email.clone())
                    .collect()
            })
        });
        let promoted_from = self.features.image_promotion_chip.as_ref().and_then(|_| {
            mat.promotion_approval_metadata
                .as_ref()
                .and_then(|p| p.promoted_from.clone())
        });

        Some(MaterialCard {
            index,
            image: mat.image.clone(),
            cta_label: cta.label(),
            cta_tooltip: cta.tooltip(),
            interactive: cta.is_interactive(),
            can_expire_approval: can_expire_approval(mat, &ctx, requested_user_id, selectable_list),
            approval_info,
            promoted_from,
            in_edit_mode,
        })
    }

    /// Console-wide announcement, hidden while the config diff is open
    #[must_use]
    pub fn announcement_banner(&self) -> Option<&str> {
        let msg = self.config.announcement_banner_msg.as_deref()?;
        if self.state.lock().query.is_config_diff_view() {
            return None;
        }
        Some(msg)
    }

    /// Banner for the active deployment window, when the capability exists
    #[must_use]
    pub fn window_banner(&self) -> Option<DeploymentWindow> {
        self.features.maintenance_window_bar.as_ref()?;
        self.state.lock().window.clone().filter(|w| w.is_active)
    }

    pub fn set_runtime_params(&self, params: Vec<RuntimeParam>) {
        self.state.lock().runtime_params = params;
    }

    pub fn set_runtime_params_errors(&self, errors: RuntimeParamsErrorState) {
        self.state.lock().runtime_params_errors = errors;
    }

    /// Pick the deployment configuration to deploy with
    pub fn select_config_to_deploy(&self, option: DeployConfigOption) {
        let query = {
            let mut state = self.state.lock();
            state.config_to_deploy = option;
            state.query = state.query.clone().with_deploy(option);
            state.query.clone()
        };
        self.services.navigator.push_query(&query);
    }

    /// Switch between the material list and the config review
    pub fn set_view_mode(&self, mode: ViewMode) {
        let query = {
            let mut state = self.state.lock();
            let mut query = state.query.clone();
            if mode == ViewMode::ReviewConfig {
                let value = config_to_deploy_value(self.target.material_type, &query);
                query.set(PARAM_DEPLOY, value);
            }
            state.query = query.with_mode(mode);
            state.query.clone()
        };
        self.services.navigator.push_query(&query);
    }

    fn config_diff_key(&self, state: &SessionState) -> Option<ConfigDiffKey> {
        let wfr_id = if state.is_rollback_trigger {
            Some(state.list.selected()?.wfr_id?)
        } else {
            None
        };
        Some(ConfigDiffKey {
            app_id: self.target.app_id?,
            env_id: self.target.env_id,
            pipeline_id: self.target.pipeline_id?,
            wfr_id,
            is_rollback: state.is_rollback_trigger,
        })
    }

    /// Refetch the config diff when the selection's key changed
    ///
    /// Only the response for the latest key is applied.
    pub async fn sync_config_diff(&self) {
        let Some(service) = &self.services.config_diff else {
            return;
        };
        let key = {
            let mut state = self.state.lock();
            let Some(key) = self.config_diff_key(&state) else {
                // a snapshot for another selection must not gate this one
                state.config_diff.reset();
                return;
            };
            if !state.config_diff.begin(key) {
                return;
            }
            key
        };

        debug!(?key, "fetching config diff");
        let result = service.fetch_config_diff(key).await;
        if let Err(err) = &result {
            if !err.is_aborted() {
                warn!(error = %err, "config diff failed");
            }
        }

        let fallback = {
            let mut state = self.state.lock();
            let applied = state.config_diff.complete(key, result);
            if applied
                && state.config_to_deploy == DeployConfigOption::LatestTrigger
                && state.config_diff.no_last_deployment_config()
            {
                state.config_to_deploy = DeployConfigOption::LastSaved;
                state.query = state.query.clone().with_deploy(DeployConfigOption::LastSaved);
                Some(state.query.clone())
            } else {
                None
            }
        };
        if let Some(query) = fallback {
            info!("no previous deployment, falling back to last saved config");
            self.services.navigator.push_query(&query);
        }
    }

    /// Deploy button as currently rendered
    #[must_use]
    pub fn deploy_button(&self) -> DeployButton {
        let state = self.state.lock();
        let reason = state.gate().blocked_reason();
        let deploying_without_approval = state.meta.is_approval_configured()
            && state.meta.is_exception_user
            && state.list.selected().is_some_and(|m| {
                !m.user_approval_metadata
                    .as_ref()
                    .is_some_and(|r| r.approval_runtime_state.is_approved())
            });

        presentation::deploy_button(&DeployButtonInput {
            stage_type: self.target.stage_type,
            is_virtual_environment: self.target.is_virtual_environment,
            window: state.window.as_ref(),
            blocked_reason: reason.as_ref(),
            deploying: self.trigger.is_deploying(),
            config_to_deploy: state.config_to_deploy,
            config_diff: &state.config_diff,
            deploying_without_approval,
        })
    }

    /// Handle a deploy click
    ///
    /// # Errors
    /// [`TriggerError`] for every validation failure, and
    /// [`TriggerError::AlreadyDeploying`] while a deploy is in flight.
    pub async fn request_deploy(&self) -> Result<TriggerOutcome, SessionError> {
        self.trigger.begin()?;
        self.run_attempt(false).await
    }

    /// Proceed past the deployment window warning
    ///
    /// Preconditions are checked again since the selection may have changed.
    ///
    /// # Errors
    /// [`TriggerError::NoPendingConfirmation`] when nothing is awaiting
    /// confirmation, otherwise as [`Self::request_deploy`].
    pub async fn confirm_deployment_window(&self) -> Result<TriggerOutcome, SessionError> {
        if !self.trigger.is_awaiting_confirmation() {
            return Err(TriggerError::NoPendingConfirmation.into());
        }
        self.trigger.begin()?;
        self.run_attempt(true).await
    }

    pub fn dismiss_window_confirmation(&self) {
        self.trigger.dismiss_confirmation();
    }

    fn validate(&self, confirmed: bool) -> Result<Option<DeployRequest>, TriggerError> {
        let mut state = self.state.lock();

        if let Some(validator) = &self.features.runtime_params_validator {
            state.runtime_params_errors = validator.validate(&state.runtime_params);
        }
        if !state.runtime_params_errors.is_valid {
            return Err(TriggerError::RuntimeParamsInvalid);
        }

        if let Some(reason) = state.gate().blocked_reason() {
            return Err(reason);
        }
        let Some(selected) = state.list.selected() else {
            return Err(TriggerError::NoSelection);
        };

        let missing = MissingIds {
            app_id: self.target.app_id.is_none(),
            pipeline_id: self.target.pipeline_id.is_none(),
            artifact_id: selected.id == 0,
        };
        let (Some(app_id), Some(pipeline_id), false) =
            (self.target.app_id, self.target.pipeline_id, missing.artifact_id)
        else {
            return Err(TriggerError::MissingIds(missing));
        };

        if !confirmed
            && state
                .window
                .as_ref()
                .is_some_and(DeploymentWindow::requires_confirmation)
        {
            return Ok(None);
        }

        let constrained = state.constrained_mode();
        let workflow_run_id = if state.is_rollback_trigger {
            selected.wfr_id
        } else if state.is_select_image_trigger {
            state.config_diff.last_deployment_wfr_id()
        } else {
            None
        };

        Ok(Some(DeployRequest {
            pipeline_id,
            ci_artifact_id: selected.id,
            app_id,
            stage_type: self.target.stage_type,
            deployment_with_config: constrained.then_some(state.config_to_deploy),
            workflow_run_id,
            runtime_params: state.runtime_params.clone(),
            is_rollback_trigger: state.is_rollback_trigger,
        }))
    }

    async fn run_attempt(&self, confirmed: bool) -> Result<TriggerOutcome, SessionError> {
        let request = match self.validate(confirmed) {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!("deployment window requires confirmation");
                self.trigger.await_confirmation()?;
                return Ok(TriggerOutcome::AwaitingConfirmation);
            }
            Err(err) if err.is_disabled_precondition() => {
                debug!(reason = %err, "deploy blocked by precondition");
                self.trigger.block();
                return Err(err.into());
            }
            Err(err) => {
                let message = match &err {
                    TriggerError::MissingIds(ids) => ids.message(),
                    _ => RESOLVE_ERRORS_MESSAGE.to_string(),
                };
                self.services.notifier.notify(Toast::error(message));
                self.trigger.abort_validation();
                return Err(err.into());
            }
        };

        let result = self
            .trigger
            .deploy(
                request,
                &self.target,
                self.services.deploy.as_ref(),
                self.services.notifier.as_ref(),
            )
            .await?;

        match result {
            DeployResult::Succeeded { attempt, response } => {
                let manifest_url = self.manifest_url(response.helm_package_name);
                self.services.navigator.close_modal();
                Ok(TriggerOutcome::Deployed {
                    attempt,
                    manifest_url,
                })
            }
            DeployResult::Failed { attempt, aborted } => Ok(TriggerOutcome::Failed { attempt, aborted }),
        }
    }

    fn manifest_url(&self, helm_package_name: Option<String>) -> Option<String> {
        if !self.target.is_manifest_download() {
            return None;
        }
        let downloader = self.features.manifest_downloader.as_ref()?;
        Some(downloader.download_manifest_url(ManifestRequest {
            app_id: self.target.app_id.unwrap_or_default(),
            env_id: self.target.env_id,
            app_name: self.target.app_name.clone(),
            helm_package_name,
            cd_workflow_type: self.target.stage_type,
        }))
    }

    /// Tear down: cancel every outstanding request including a deploy
    pub fn unmount(&self) {
        info!(pipeline_id = ?self.target.pipeline_id, "closing material session");
        self.fetcher.cancel_all();
        self.trigger.cancel();
    }

    #[must_use]
    pub fn empty_state(&self) -> Option<EmptyState> {
        let mut state = self.state.lock();
        let ctx = state.partition_context();
        let trigger_blocked = state.status == LoadStatus::TriggerBlocked;
        let no_more_images = state.no_more_images;
        let is_rollback = state.is_rollback_trigger;
        let total_loaded = state.list.len();
        let partition = state.list.partition(&ctx);
        presentation::empty_state(&EmptyStateInput {
            trigger_blocked,
            visible_count: partition.eligible.len(),
            total_loaded,
            consumed_count: partition.consumed.len(),
            eligible_count: partition.eligible_count,
            resource_filters_present: ctx.resource_filters_present,
            search_applied: ctx.search_applied,
            approval_configured: ctx.approval_configured,
            no_more_images,
            is_rollback,
        })
    }

    #[must_use]
    pub fn header_text(&self) -> String {
        presentation::header_text(
            self.target.stage_type,
            self.state.lock().is_rollback_trigger,
            &self.target.env_name,
            self.target.is_virtual_environment,
        )
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        self.state.lock().status.clone()
    }

    #[must_use]
    pub fn materials(&self) -> Vec<Material> {
        self.state.lock().list.as_slice().to_vec()
    }

    #[must_use]
    pub fn selected(&self) -> Option<Material> {
        self.state.lock().list.selected().cloned()
    }

    #[must_use]
    pub fn are_materials_passing_filters(&self) -> bool {
        self.state.lock().list.are_materials_passing_filters()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.state.lock().total_count
    }

    #[must_use]
    pub fn no_more_images(&self) -> bool {
        self.state.lock().no_more_images
    }

    #[must_use]
    pub fn is_loading_more(&self) -> bool {
        self.fetcher.is_loading_more()
    }

    #[must_use]
    pub fn search(&self) -> Option<String> {
        self.state.lock().search.clone()
    }

    #[must_use]
    pub fn filter_view(&self) -> FilterView {
        self.state.lock().filter_view
    }

    #[must_use]
    pub fn config_to_deploy(&self) -> DeployConfigOption {
        self.state.lock().config_to_deploy
    }

    #[must_use]
    pub fn query(&self) -> TriggerQuery {
        self.state.lock().query.clone()
    }

    #[must_use]
    pub fn window(&self) -> Option<DeploymentWindow> {
        self.state.lock().window.clone()
    }

    #[must_use]
    pub fn runtime_params(&self) -> Vec<RuntimeParam> {
        self.state.lock().runtime_params.clone()
    }

    #[must_use]
    pub fn runtime_params_errors(&self) -> RuntimeParamsErrorState {
        self.state.lock().runtime_params_errors.clone()
    }

    #[must_use]
    pub fn tags_editable(&self) -> bool {
        self.state.lock().meta.tags_editable
    }

    #[must_use]
    pub fn config_diff(&self) -> ConfigDiffSnapshot {
        self.state.lock().config_diff.clone()
    }

    #[must_use]
    pub fn phase(&self) -> TriggerPhase {
        self.trigger.phase()
    }

    #[must_use]
    pub fn last_terminal_phase(&self) -> Option<TriggerPhase> {
        self.trigger.last_terminal()
    }

    #[must_use]
    pub fn is_deploying(&self) -> bool {
        self.trigger.is_deploying()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MockDeployService, MockMaterialService, MockNavigator, MockNotifier};
    use cdm_material::{AppliedFilter, ApprovalRecord, ApprovalRuntimeState, FilterState, UserApprovalConfig};
    use pretty_assertions::assert_eq;

    fn page(count: u64, total: usize) -> MaterialsPage {
        let materials = (0..count)
            .map(|i| Material::new(i + 1, format!("app:{}", i + 1), 0))
            .collect();
        MaterialsPage::new(materials, total)
    }

    fn quiet_navigator() -> MockNavigator {
        let mut navigator = MockNavigator::new();
        navigator.expect_push_query().return_const(());
        navigator.expect_close_modal().return_const(());
        navigator
    }

    fn session_with(
        materials: MockMaterialService,
        deploy: MockDeployService,
        notifier: MockNotifier,
    ) -> CdMaterialSession {
        let services = SessionServices::new(
            Arc::new(materials),
            Arc::new(deploy),
            Arc::new(notifier),
            Arc::new(quiet_navigator()),
        );
        CdMaterialSession::new(
            PipelineTarget::new(1, 2, 3).with_env_name("prod"),
            ConsoleConfig::default(),
            OptionalFeatures::none(),
            services,
        )
    }

    #[tokio::test]
    async fn load_sets_no_more_images_from_total() {
        let mut materials = MockMaterialService::new();
        materials
            .expect_fetch_materials()
            .returning(|_, _, _, _, _| Ok(page(20, 25)));
        let session = session_with(materials, MockDeployService::new(), MockNotifier::new());

        session.load().await.unwrap();
        assert_eq!(session.status(), LoadStatus::Loaded);
        assert_eq!(session.materials().len(), 20);
        assert!(!session.no_more_images());
        assert_eq!(session.header_text(), "Deploy to prod");
    }

    #[tokio::test]
    async fn approval_split_deselects_unapproved() {
        let mut materials = MockMaterialService::new();
        materials.expect_fetch_materials().returning(|_, _, _, _, _| {
            let mut unapproved = Material::new(2, "app:2", 1)
                .with_approval(ApprovalRecord::with_state(ApprovalRuntimeState::INIT));
            unapproved.is_selected = true;
            let mut page = MaterialsPage::new(
                vec![
                    Material::new(1, "app:1", 0).with_approval(ApprovalRecord::approved()),
                    unapproved,
                ],
                2,
            );
            page.user_approval_config = Some(UserApprovalConfig { required_count: 1 });
            Ok(page)
        });
        let session = session_with(materials, MockDeployService::new(), MockNotifier::new());
        session.load().await.unwrap();

        let summary = session.partition_summary();
        assert_eq!(summary.consumed, vec![2]);
        assert_eq!(summary.eligible, vec![1]);
        assert!(session.selected().is_none());
        assert!(matches!(
            session.select(1).await,
            Err(SessionError::NotSelectable { index: 1 })
        ));
    }

    #[tokio::test]
    async fn runtime_param_errors_block_with_toast() {
        let mut materials = MockMaterialService::new();
        materials
            .expect_fetch_materials()
            .returning(|_, _, _, _, _| Ok(page(1, 1)));
        let mut deploy = MockDeployService::new();
        deploy.expect_trigger_deploy().never();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|t| t.description == RESOLVE_ERRORS_MESSAGE)
            .times(1)
            .return_const(());

        let session = session_with(materials, deploy, notifier);
        session.load().await.unwrap();
        session.select(0).await.unwrap();
        session.set_runtime_params_errors(RuntimeParamsErrorState::invalid("TAG", "required"));

        let err = session.request_deploy().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Trigger(TriggerError::RuntimeParamsInvalid)
        ));
        assert_eq!(session.phase(), TriggerPhase::Idle);
    }

    #[tokio::test]
    async fn no_selection_blocks_without_toast() {
        let mut materials = MockMaterialService::new();
        materials
            .expect_fetch_materials()
            .returning(|_, _, _, _, _| Ok(page(2, 2)));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        let session = session_with(materials, MockDeployService::new(), notifier);
        session.load().await.unwrap();

        assert!(session.deploy_button().disabled);
        let err = session.request_deploy().await.unwrap_err();
        assert!(matches!(err, SessionError::Trigger(TriggerError::NoSelection)));
        assert_eq!(session.last_terminal_phase(), Some(TriggerPhase::Blocked));
        assert_eq!(session.phase(), TriggerPhase::Idle);
    }

    #[tokio::test]
    async fn filters_not_passing_sets_tooltip() {
        let mut materials = MockMaterialService::new();
        materials.expect_fetch_materials().returning(|_, _, _, _, _| {
            let mut blocked = Material::new(1, "app:1", 0).with_filter_state(FilterState::Blocked);
            blocked.is_selected = true;
            let mut page = MaterialsPage::new(vec![blocked], 1);
            page.resource_filters = vec![AppliedFilter {
                id: 1,
                name: "branch".into(),
                description: None,
            }];
            Ok(page)
        });
        let session = session_with(materials, MockDeployService::new(), MockNotifier::new());
        session.load().await.unwrap();

        let button = session.deploy_button();
        assert!(button.disabled);
        assert_eq!(button.tooltip, Some(presentation::TOOLTIP_NO_ELIGIBLE));
        assert_eq!(
            session.empty_state(),
            Some(EmptyState::NoEligibleImages {
                can_load_more: false
            })
        );
        assert_eq!(
            session.partition_summary().tabs.map(|t| t.eligible),
            Some("Eligible images 0/1".to_string())
        );
    }

    #[tokio::test]
    async fn edit_mode_toggles() {
        let session = session_with(
            MockMaterialService::new(),
            MockDeployService::new(),
            MockNotifier::new(),
        );
        assert!(session.toggle_edit_mode(3));
        assert!(session.is_in_edit_mode(3));
        assert!(!session.toggle_edit_mode(3));
        assert!(!session.is_in_edit_mode(4));
    }

    #[tokio::test]
    async fn deploy_cancel_leaves_page_scope_alive() {
        let mut materials = MockMaterialService::new();
        materials
            .expect_fetch_materials()
            .times(2)
            .returning(|_, _, _, _, _| Ok(page(20, 25)));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).return_const(());
        notifier.expect_show_error().never();
        let session = session_with(materials, MockDeployService::new(), notifier);

        session.load().await.unwrap();
        session.trigger.cancel();

        assert_eq!(session.load_older().await.unwrap(), 20);
        assert_eq!(session.materials().len(), 40);
    }

    #[tokio::test]
    async fn load_older_before_load_is_rejected() {
        let session = session_with(
            MockMaterialService::new(),
            MockDeployService::new(),
            MockNotifier::new(),
        );
        assert!(matches!(
            session.load_older().await,
            Err(SessionError::NotLoaded)
        ));
    }

    #[test]
    fn review_mode_writes_deploy_param() {
        let services = SessionServices::new(
            Arc::new(MockMaterialService::new()),
            Arc::new(MockDeployService::new()),
            Arc::new(MockNotifier::new()),
            Arc::new(quiet_navigator()),
        );
        let session = CdMaterialSession::new(
            PipelineTarget::new(1, 2, 3).with_material_type(MaterialType::RollbackList),
            ConsoleConfig::default(),
            OptionalFeatures::none(),
            services,
        )
        .with_query(TriggerQuery::parse("sortBy=name"));

        assert_eq!(session.config_to_deploy(), DeployConfigOption::SpecificTrigger);
        session.set_view_mode(ViewMode::ReviewConfig);
        assert!(session.query().is_config_diff_view());
        session.set_view_mode(ViewMode::List);
        assert_eq!(session.query().get("sortBy"), None);
        assert_eq!(session.header_text(), "Rollback for ");
    }

    #[test]
    fn announcement_banner_hidden_in_config_diff_view() {
        let services = SessionServices::new(
            Arc::new(MockMaterialService::new()),
            Arc::new(MockDeployService::new()),
            Arc::new(MockNotifier::new()),
            Arc::new(quiet_navigator()),
        );
        let session = CdMaterialSession::new(
            PipelineTarget::new(1, 2, 3).with_material_type(MaterialType::RollbackList),
            ConsoleConfig::default().with_announcement_banner("Maintenance at 22:00 UTC"),
            OptionalFeatures::none(),
            services,
        );

        assert_eq!(session.announcement_banner(), Some("Maintenance at 22:00 UTC"));
        session.set_view_mode(ViewMode::ReviewConfig);
        assert_eq!(session.announcement_banner(), None);
        session.set_view_mode(ViewMode::List);
        assert_eq!(session.announcement_banner(), Some("Maintenance at 22:00 UTC"));
    }

    #[test]
    fn announcement_banner_absent_without_message() {
        let session = session_with(
            MockMaterialService::new(),
            MockDeployService::new(),
            MockNotifier::new(),
        );
        assert_eq!(session.announcement_banner(), None);
    }
}
