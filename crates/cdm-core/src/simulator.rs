//! In-process session simulator
//!
//! Drives a full [`CdMaterialSession`] against fixture-backed services:
//! load, optional "load older", selection, deploy and window confirmation.
//! Used by the `cdm simulate` subcommand; the recording collaborators are
//! also what the integration tests observe.

use crate::config::ConsoleConfig;
use crate::config_diff::{ConfigDiffData, ConfigDiffKey};
use crate::error::{ServerErrors, ServiceError};
use crate::features::OptionalFeatures;
use crate::notify::Toast;
use crate::presentation::{DeployButton, EmptyState};
use crate::query::TriggerQuery;
use crate::services::{
    ConfigDiffService, DeployService, DeploymentWindowService, ManifestDownloader, MaterialService,
    Navigator, Notifier, PolicyConsequenceService,
};
use crate::session::{CdMaterialSession, LoadStatus, PartitionSummary, SessionServices};
use crate::trigger::{TriggerOutcome, TriggerPhase};
use crate::types::{
    ActionState, DeployRequest, DeployResponse, DeploymentWindow, ManifestRequest,
    MaterialListKind, MaterialsPage, PageRequest, PipelineTarget, PolicyConsequences, StageType,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a simulated session is served from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    /// Full material listing; pages are sliced out of it
    pub page: MaterialsPage,
    pub target: Option<PipelineTarget>,
    pub window: Option<DeploymentWindow>,
    pub policy: Option<PolicyConsequences>,
    pub config_diff: Option<ConfigDiffData>,
    /// Deploy fails with this error when set
    pub deploy_error: Option<ServerErrors>,
}

impl Fixture {
    /// Parse a JSON fixture
    ///
    /// # Errors
    /// Malformed JSON or fields of the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Serves pages sliced out of a fixture listing
#[derive(Debug)]
pub struct FixtureMaterialService {
    listing: MaterialsPage,
    requests: Mutex<Vec<PageRequest>>,
}

impl FixtureMaterialService {
    #[must_use]
    pub fn new(listing: MaterialsPage) -> Self {
        Self {
            listing,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every page request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    /// Page of `listing` for `request`, searching by image substring
    #[must_use]
    pub fn slice(listing: &MaterialsPage, request: &PageRequest) -> MaterialsPage {
        let matching: Vec<_> = listing
            .materials
            .iter()
            .filter(|m| request.search.as_deref().map_or(true, |s| m.image.contains(s)))
            .cloned()
            .collect();
        let total_count = if request.search.is_some() {
            matching.len()
        } else {
            listing.total_count.max(matching.len())
        };
        let materials = matching
            .into_iter()
            .skip(request.offset)
            .take(request.size)
            .collect();
        MaterialsPage {
            materials,
            total_count,
            ..listing.clone()
        }
    }
}

#[async_trait]
impl MaterialService for FixtureMaterialService {
    async fn fetch_materials(
        &self,
        _kind: MaterialListKind,
        _pipeline_id: u64,
        _stage: StageType,
        page: PageRequest,
        _cancel: CancellationToken,
    ) -> Result<MaterialsPage, ServiceError> {
        let result = Self::slice(&self.listing, &page);
        self.requests.lock().push(page);
        Ok(result)
    }
}

/// Deploy service answering from the fixture
#[derive(Debug, Default)]
pub struct FixtureDeployService {
    error: Option<ServerErrors>,
    requests: Mutex<Vec<DeployRequest>>,
}

impl FixtureDeployService {
    #[must_use]
    pub fn new(error: Option<ServerErrors>) -> Self {
        Self {
            error,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DeployService for FixtureDeployService {
    async fn trigger_deploy(
        &self,
        request: DeployRequest,
        _cancel: CancellationToken,
    ) -> Result<DeployResponse, ServiceError> {
        self.requests.lock().push(request);
        match &self.error {
            Some(err) => Err(ServiceError::Server(err.clone())),
            None => Ok(DeployResponse {
                helm_package_name: Some("package.tgz".to_string()),
            }),
        }
    }
}

/// Fixed deployment window
#[derive(Debug, Clone)]
pub struct StaticWindowService(pub DeploymentWindow);

#[async_trait]
impl DeploymentWindowService for StaticWindowService {
    async fn fetch_deployment_window(
        &self,
        _app_id: u64,
        _env_id: u64,
    ) -> Result<DeploymentWindow, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Fixed policy consequences
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicyService(pub PolicyConsequences);

#[async_trait]
impl PolicyConsequenceService for StaticPolicyService {
    async fn fetch_policy_consequences(
        &self,
        _app_id: u64,
        _env_id: u64,
    ) -> Result<PolicyConsequences, ServiceError> {
        Ok(self.0)
    }
}

/// Fixed config diff, counting fetches
#[derive(Debug, Default)]
pub struct StaticConfigDiffService {
    data: ConfigDiffData,
    fetches: AtomicUsize,
}

impl StaticConfigDiffService {
    #[must_use]
    pub fn new(data: ConfigDiffData) -> Self {
        Self {
            data,
            fetches: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ConfigDiffService for StaticConfigDiffService {
    async fn fetch_config_diff(&self, _key: ConfigDiffKey) -> Result<ConfigDiffData, ServiceError> {
        self.fetches.fetch_add(1, Ordering::AcqRel);
        Ok(self.data.clone())
    }
}

/// Builds `/manifest/<app>/<env>/<package>` links
#[derive(Debug, Clone, Copy, Default)]
pub struct PathManifestDownloader;

impl ManifestDownloader for PathManifestDownloader {
    fn download_manifest_url(&self, request: ManifestRequest) -> String {
        format!(
            "/manifest/{}/{}/{}?stage={}",
            request.app_id,
            request.env_id,
            request.helm_package_name.unwrap_or_default(),
            request.cd_workflow_type
        )
    }
}

/// Notifier that keeps everything it was asked to show
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
    errors: Mutex<Vec<ServiceError>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    /// Errors passed to the global presenter
    #[must_use]
    pub fn errors(&self) -> Vec<ServiceError> {
        self.errors.lock().clone()
    }

    pub fn clear(&self) {
        self.toasts.lock().clear();
        self.errors.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().push(toast);
    }

    fn show_error(&self, error: &ServiceError) {
        self.errors.lock().push(error.clone());
    }
}

/// Navigator that keeps every pushed query
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    queries: Mutex<Vec<TriggerQuery>>,
    closed: AtomicUsize,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn queries(&self) -> Vec<TriggerQuery> {
        self.queries.lock().clone()
    }

    #[must_use]
    pub fn last_query(&self) -> Option<TriggerQuery> {
        self.queries.lock().last().cloned()
    }

    /// How often the modal was closed
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }
}

impl Navigator for RecordingNavigator {
    fn push_query(&self, query: &TriggerQuery) {
        self.queries.lock().push(query.clone());
    }

    fn close_modal(&self) {
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}

/// What to do during a simulated session
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    /// Card to select before deploying; no deploy without one
    pub select: Option<usize>,
    /// Overrides the fixture's deployment window
    pub window: Option<ActionState>,
    /// Confirm the deployment window warning when asked
    pub confirm: bool,
    pub load_older: bool,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub header: String,
    pub status: LoadStatus,
    pub materials_loaded: usize,
    pub total_count: usize,
    pub no_more_images: bool,
    pub partition: PartitionSummary,
    pub empty_state: Option<EmptyState>,
    pub deploy_button: DeployButton,
    pub outcome: Option<TriggerOutcome>,
    pub error: Option<String>,
    pub phase: TriggerPhase,
    pub deploy_requests: usize,
    pub toasts: Vec<Toast>,
    pub presented_errors: Vec<String>,
}

impl SimulationReport {
    /// Session ended with a deploy that went out
    #[must_use]
    pub fn deployed(&self) -> bool {
        matches!(self.outcome, Some(TriggerOutcome::Deployed { .. }))
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("=== {} ===\n\n", self.header));
        report.push_str(&format!("Status: {:?}\n", self.status));
        report.push_str(&format!(
            "Materials: {} of {} (no more images: {})\n",
            self.materials_loaded, self.total_count, self.no_more_images
        ));
        report.push_str(&format!(
            "Eligible: {:?} (count {})\n",
            self.partition.eligible, self.partition.eligible_count
        ));
        if !self.partition.consumed.is_empty() {
            report.push_str(&format!("Consumed: {:?}\n", self.partition.consumed));
        }
        if let Some(empty) = self.empty_state {
            report.push_str(&format!("Empty state: {}\n", empty.title()));
        }
        report.push_str(&format!(
            "Button: {} ({:?}{})\n",
            self.deploy_button.label,
            self.deploy_button.style,
            if self.deploy_button.disabled { ", disabled" } else { "" }
        ));
        if let Some(tooltip) = self.deploy_button.tooltip {
            report.push_str(&format!("Tooltip: {tooltip}\n"));
        }
        if let Some(outcome) = &self.outcome {
            report.push_str(&format!("Outcome: {outcome:?}\n"));
        }
        if let Some(error) = &self.error {
            report.push_str(&format!("Error: {error}\n"));
        }
        report.push_str(&format!(
            "Phase: {:?}, deploy requests: {}\n",
            self.phase, self.deploy_requests
        ));

        if !self.toasts.is_empty() {
            report.push_str("\n=== Toasts ===\n");
            for (i, toast) in self.toasts.iter().enumerate() {
                report.push_str(&format!("{}. [{:?}] {}\n", i + 1, toast.variant, toast.description));
            }
        }
        if !self.presented_errors.is_empty() {
            report.push_str("\n=== Errors ===\n");
            for (i, err) in self.presented_errors.iter().enumerate() {
                report.push_str(&format!("{}. {err}\n", i + 1));
            }
        }
        report
    }
}

/// Run one simulated session over `fixture`
pub async fn run_simulation(fixture: Fixture, config: SimulationConfig) -> SimulationReport {
    let target = fixture
        .target
        .clone()
        .unwrap_or_else(|| PipelineTarget::new(1, 1, 1).with_env_name("simulated"));
    let notifier = Arc::new(RecordingNotifier::new());
    let navigator = Arc::new(RecordingNavigator::new());
    let deploy = Arc::new(FixtureDeployService::new(fixture.deploy_error.clone()));

    let mut services = SessionServices::new(
        Arc::new(FixtureMaterialService::new(fixture.page.clone())),
        deploy.clone(),
        notifier.clone(),
        navigator,
    );
    if let Some(diff) = fixture.config_diff.clone() {
        services = services.with_config_diff(Arc::new(StaticConfigDiffService::new(diff)));
    }

    let mut features = OptionalFeatures::none()
        .with_maintenance_window_bar()
        .with_manifest_downloader(Arc::new(PathManifestDownloader));
    let window = match (config.window, fixture.window.clone()) {
        (Some(state), _) => Some(DeploymentWindow::with_state(state)),
        (None, window) => window,
    };
    if let Some(window) = window {
        features = features.with_deployment_window_service(Arc::new(StaticWindowService(window)));
    }
    if let Some(policy) = fixture.policy {
        features = features.with_policy_consequences(Arc::new(StaticPolicyService(policy)));
    }

    let session = CdMaterialSession::new(target, config.console.clone(), features, services);
    info!(pipeline_id = ?session.target().pipeline_id, "simulating material session");

    let mut error = None;
    let mut outcome = None;
    if let Err(err) = session.load().await {
        error = Some(err.to_string());
    }
    if error.is_none() && config.load_older && !session.no_more_images() {
        if let Err(err) = session.load_older().await {
            error = Some(err.to_string());
        }
    }
    if let (None, Some(index)) = (&error, config.select) {
        let attempt = async {
            session.select(index).await?;
            let mut result = session.request_deploy().await?;
            if result == TriggerOutcome::AwaitingConfirmation && config.confirm {
                result = session.confirm_deployment_window().await?;
            }
            Ok::<_, crate::error::SessionError>(result)
        };
        match attempt.await {
            Ok(result) => outcome = Some(result),
            Err(err) => error = Some(err.to_string()),
        }
    }

    let report = SimulationReport {
        header: session.header_text(),
        status: session.status(),
        materials_loaded: session.materials().len(),
        total_count: session.total_count(),
        no_more_images: session.no_more_images(),
        partition: session.partition_summary(),
        empty_state: session.empty_state(),
        deploy_button: session.deploy_button(),
        outcome,
        error,
        phase: session.phase(),
        deploy_requests: deploy.requests().len(),
        toasts: notifier.toasts(),
        presented_errors: notifier.errors().iter().map(ToString::to_string).collect(),
    };
    session.unmount();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdm_material::Material;

    fn listing(count: u64, total: usize) -> MaterialsPage {
        let materials = (0..count)
            .map(|i| Material::new(i + 1, format!("app:{}", i + 1), i as usize))
            .collect();
        MaterialsPage::new(materials, total)
    }

    #[test]
    fn slice_pages_and_searches() {
        let listing = listing(25, 25);
        let first = FixtureMaterialService::slice(&listing, &PageRequest::first(20, None));
        assert_eq!(first.materials.len(), 20);
        assert_eq!(first.total_count, 25);

        let older = FixtureMaterialService::slice(
            &listing,
            &PageRequest {
                offset: 20,
                size: 20,
                search: None,
            },
        );
        assert_eq!(older.materials.len(), 5);

        let search = FixtureMaterialService::slice(
            &listing,
            &PageRequest::first(20, Some("app:2".into())),
        );
        assert_eq!(search.total_count, 7);
    }

    #[test]
    fn fixture_parses_camel_case() {
        let fixture = Fixture::from_json(
            r#"{"page": {"materials": [{"id": 1, "image": "a"}], "totalCount": 1},
                "window": {"userActionState": "PARTIAL"}}"#,
        )
        .unwrap();
        assert_eq!(fixture.page.materials.len(), 1);
        assert!(fixture.window.unwrap().requires_confirmation());
    }

    #[tokio::test]
    async fn simulation_deploys_selected_material() {
        let fixture = Fixture {
            page: listing(3, 3),
            ..Fixture::default()
        };
        let report = run_simulation(
            fixture,
            SimulationConfig {
                select: Some(1),
                ..SimulationConfig::default()
            },
        )
        .await;
        assert!(report.deployed(), "{}", report.generate_text());
        assert_eq!(report.deploy_requests, 1);
        assert_eq!(report.phase, TriggerPhase::Idle);
    }

    #[tokio::test]
    async fn simulation_waits_for_window_confirmation() {
        let fixture = Fixture {
            page: listing(2, 2),
            ..Fixture::default()
        };
        let report = run_simulation(
            fixture,
            SimulationConfig {
                select: Some(0),
                window: Some(ActionState::Partial),
                ..SimulationConfig::default()
            },
        )
        .await;
        assert_eq!(report.outcome, Some(TriggerOutcome::AwaitingConfirmation));
        assert_eq!(report.deploy_requests, 0);
        assert_eq!(report.phase, TriggerPhase::ConfirmingWindow);
    }
}
