//! Deployment trigger controller
//!
//! Per attempt:
//! `Idle -> Validating -> (Blocked | ConfirmingWindow | Deploying) -> (Succeeded | Failed) -> Idle`
//!
//! The deploy request runs under the deploy scope, which is created once
//! per session and cancelled only on teardown. The busy flag is held for
//! the whole `Deploying` phase so a second deploy can never be issued.

use crate::cancel::{run_cancellable, CancelScope};
use crate::config_diff::ConfigDiffSnapshot;
use crate::error::{ServiceError, TriggerError};
use crate::notify::{Toast, VIEW_DETAILS};
use crate::services::{DeployService, Notifier};
use crate::types::{DeployConfigOption, DeployRequest, DeployResponse, PipelineTarget};
use cdm_material::{is_image_approver, Material};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use ulid::Ulid;

pub const RESOLVE_ERRORS_MESSAGE: &str = "Please resolve all the errors before deploying";
pub const ROLLBACK_INITIATED: &str = "Rollback Initiated";
pub const DEPLOYMENT_INITIATED: &str = "Deployment Initiated";

/// Phase of the current trigger attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum TriggerPhase {
    #[default]
    Idle,
    Validating,
    Blocked,
    ConfirmingWindow,
    Deploying,
    Succeeded,
    Failed,
}

#[must_use]
pub fn allowed_transitions(from: TriggerPhase) -> Vec<TriggerPhase> {
    match from {
        TriggerPhase::Idle => vec![TriggerPhase::Validating],
        TriggerPhase::Validating => vec![
            TriggerPhase::Blocked,
            TriggerPhase::ConfirmingWindow,
            TriggerPhase::Deploying,
            TriggerPhase::Idle,
        ],
        TriggerPhase::Blocked => vec![TriggerPhase::Idle],
        TriggerPhase::ConfirmingWindow => vec![TriggerPhase::Validating, TriggerPhase::Idle],
        TriggerPhase::Deploying => vec![TriggerPhase::Succeeded, TriggerPhase::Failed],
        TriggerPhase::Succeeded | TriggerPhase::Failed => vec![TriggerPhase::Idle],
    }
}

/// Check a phase transition
///
/// # Errors
/// [`TriggerError::IllegalTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(from: TriggerPhase, to: TriggerPhase) -> Result<(), TriggerError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TriggerError::IllegalTransition { from, to })
    }
}

/// Inputs to the disabled-button preconditions
#[derive(Debug, Clone, Copy)]
pub struct TriggerGate<'a> {
    pub selected: Option<&'a Material>,
    pub are_materials_passing_filters: bool,
    pub is_rollback_trigger: bool,
    pub config_to_deploy: DeployConfigOption,
    pub config_diff: &'a ConfigDiffSnapshot,
    pub can_approver_deploy: bool,
    pub trigger_blocked: bool,
}

impl TriggerGate<'_> {
    /// First precondition that keeps the deploy button disabled
    #[must_use]
    pub fn blocked_reason(&self) -> Option<TriggerError> {
        if self.trigger_blocked {
            return Some(TriggerError::TriggerBlocked);
        }
        let Some(selected) = self.selected else {
            return Some(TriggerError::NoSelection);
        };
        if !self.are_materials_passing_filters {
            return Some(TriggerError::FiltersNotPassing);
        }
        if self.is_rollback_trigger {
            if self.config_diff.is_loading() {
                return Some(TriggerError::ConfigLoading);
            }
            if !self.config_diff.can_deploy_with_config(self.config_to_deploy) {
                return Some(TriggerError::ConfigUnavailable);
            }
        }
        if self.config_to_deploy == DeployConfigOption::LatestTrigger
            && self.config_diff.no_last_deployment_config()
        {
            return Some(TriggerError::NoLastDeploymentConfig);
        }
        if !self.can_approver_deploy && is_image_approver(selected.user_approval_metadata.as_ref()) {
            return Some(TriggerError::ApproverCannotDeploy);
        }
        None
    }

    #[inline]
    #[must_use]
    pub fn is_deploy_disabled(&self) -> bool {
        self.blocked_reason().is_some()
    }
}

/// What a deploy request produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TriggerOutcome {
    /// Waiting for the user to confirm the deployment window warning
    AwaitingConfirmation,
    Deployed {
        attempt: String,
        manifest_url: Option<String>,
    },
    /// Request failed; the failure was already presented (or suppressed)
    Failed { attempt: String, aborted: bool },
}

/// Controller state shared across attempts
#[derive(Debug)]
pub struct TriggerController {
    phase: Mutex<TriggerPhase>,
    last_terminal: Mutex<Option<TriggerPhase>>,
    deploying: AtomicBool,
    deploy_scope: CancelScope,
}

impl Default for TriggerController {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the busy flag; always returns the controller to `Idle`
struct DeployingGuard<'a> {
    controller: &'a TriggerController,
}

impl Drop for DeployingGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.controller.phase.lock();
        if *phase != TriggerPhase::Idle {
            *self.controller.last_terminal.lock() = Some(*phase);
            *phase = TriggerPhase::Idle;
        }
        self.controller.deploying.store(false, Ordering::Release);
    }
}

impl TriggerController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(TriggerPhase::Idle),
            last_terminal: Mutex::new(None),
            deploying: AtomicBool::new(false),
            deploy_scope: CancelScope::new("deploy"),
        }
    }

    #[must_use]
    pub fn phase(&self) -> TriggerPhase {
        *self.phase.lock()
    }

    /// Terminal phase of the most recent finished deploy
    #[must_use]
    pub fn last_terminal(&self) -> Option<TriggerPhase> {
        *self.last_terminal.lock()
    }

    /// Deploy button shows a spinner and ignores clicks
    #[inline]
    #[must_use]
    pub fn is_deploying(&self) -> bool {
        self.deploying.load(Ordering::Acquire)
    }

    fn transition(&self, to: TriggerPhase) -> Result<(), TriggerError> {
        let mut phase = self.phase.lock();
        validate_transition(*phase, to)?;
        debug!(from = ?*phase, to = ?to, "trigger transition");
        *phase = to;
        Ok(())
    }

    /// Enter `Validating`, from `Idle` or a pending window confirmation
    ///
    /// # Errors
    /// [`TriggerError::AlreadyDeploying`] while a deploy is in flight.
    pub fn begin(&self) -> Result<(), TriggerError> {
        let mut phase = self.phase.lock();
        match *phase {
            TriggerPhase::Idle | TriggerPhase::ConfirmingWindow => {
                *phase = TriggerPhase::Validating;
                Ok(())
            }
            TriggerPhase::Deploying => Err(TriggerError::AlreadyDeploying),
            other => Err(TriggerError::IllegalTransition {
                from: other,
                to: TriggerPhase::Validating,
            }),
        }
    }

    /// Validation failed with a toast; back to `Idle`
    pub fn abort_validation(&self) {
        if self.transition(TriggerPhase::Idle).is_err() {
            *self.phase.lock() = TriggerPhase::Idle;
        }
    }

    /// A disabled-button precondition failed
    pub fn block(&self) {
        if self.transition(TriggerPhase::Blocked).is_ok() {
            *self.last_terminal.lock() = Some(TriggerPhase::Blocked);
        }
        *self.phase.lock() = TriggerPhase::Idle;
    }

    /// Park in `ConfirmingWindow`
    ///
    /// # Errors
    /// Illegal transition when not validating.
    pub fn await_confirmation(&self) -> Result<(), TriggerError> {
        self.transition(TriggerPhase::ConfirmingWindow)
    }

    #[must_use]
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.phase() == TriggerPhase::ConfirmingWindow
    }

    /// User dismissed the window confirmation
    pub fn dismiss_confirmation(&self) {
        let mut phase = self.phase.lock();
        if *phase == TriggerPhase::ConfirmingWindow {
            *phase = TriggerPhase::Idle;
        }
    }

    fn enter_deploying(&self) -> Result<DeployingGuard<'_>, TriggerError> {
        self.deploying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TriggerError::AlreadyDeploying)?;
        if let Err(err) = self.transition(TriggerPhase::Deploying) {
            self.deploying.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(DeployingGuard { controller: self })
    }

    /// Issue the deploy request and present its outcome
    ///
    /// Must be called in `Validating`. The controller is back in `Idle`
    /// when this returns, whatever the outcome.
    ///
    /// # Errors
    /// [`TriggerError::AlreadyDeploying`] when another deploy holds the busy
    /// flag.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        target: &PipelineTarget,
        service: &dyn DeployService,
        notifier: &dyn Notifier,
    ) -> Result<DeployResult, TriggerError> {
        let guard = self.enter_deploying()?;
        let attempt = Ulid::new().to_string();
        let is_rollback = request.is_rollback_trigger;
        info!(
            attempt = %attempt,
            pipeline_id = request.pipeline_id,
            artifact_id = request.ci_artifact_id,
            stage = %request.stage_type,
            "triggering deployment"
        );

        let token = self.deploy_scope.current();
        let result = run_cancellable(&token, service.trigger_deploy(request, token.clone())).await;

        let outcome = match result {
            Ok(response) => {
                self.transition(TriggerPhase::Succeeded)?;
                info!(attempt = %attempt, "deployment initiated");
                notifier.notify(Toast::success(if is_rollback {
                    ROLLBACK_INITIATED
                } else {
                    DEPLOYMENT_INITIATED
                }));
                DeployResult::Succeeded { attempt, response }
            }
            Err(err) => {
                self.transition(TriggerPhase::Failed)?;
                let aborted = err.is_aborted();
                present_deploy_error(&err, target, notifier);
                DeployResult::Failed { attempt, aborted }
            }
        };
        drop(guard);
        Ok(outcome)
    }

    /// Cancel an in-flight deploy (view teardown only)
    pub fn cancel(&self) {
        self.deploy_scope.cancel();
    }
}

/// Raw result of [`TriggerController::deploy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployResult {
    Succeeded {
        attempt: String,
        response: DeployResponse,
    },
    Failed {
        attempt: String,
        aborted: bool,
    },
}

/// Present a deploy failure
///
/// Manifest-push environments get one persistent toast per server error
/// item with a link to the deployment steps, unless the code is 403/408.
/// Aborted requests are never shown.
pub fn present_deploy_error(err: &ServiceError, target: &PipelineTarget, notifier: &dyn Notifier) {
    if err.is_aborted() {
        debug!("deploy request aborted");
        return;
    }
    warn!(error = %err, "deployment trigger failed");

    if target.is_manifest_push() {
        if let Some(server) = err.server_errors().filter(|s| !s.is_forbidden_or_timeout()) {
            let href = target.deployment_steps_path();
            for item in &server.errors {
                notifier.notify(
                    Toast::error(item.message())
                        .with_action(VIEW_DETAILS, href.clone())
                        .persistent(),
                );
            }
            return;
        }
    }
    notifier.show_error(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServerErrorItem, ServerErrors};
    use crate::services::{MockDeployService, MockNotifier};
    use crate::types::{DeploymentAppType, StageType};
    use cdm_material::ApprovalRecord;

    fn request() -> DeployRequest {
        DeployRequest {
            pipeline_id: 3,
            ci_artifact_id: 40,
            app_id: 1,
            stage_type: StageType::Cd,
            deployment_with_config: None,
            workflow_run_id: None,
            runtime_params: vec![],
            is_rollback_trigger: false,
        }
    }

    fn push_target() -> PipelineTarget {
        PipelineTarget::new(1, 2, 3).virtual_env(DeploymentAppType::ManifestPush)
    }

    #[test]
    fn transition_table() {
        assert!(validate_transition(TriggerPhase::Idle, TriggerPhase::Validating).is_ok());
        assert!(validate_transition(TriggerPhase::Validating, TriggerPhase::Deploying).is_ok());
        assert!(validate_transition(TriggerPhase::Idle, TriggerPhase::Deploying).is_err());
        assert!(validate_transition(TriggerPhase::Deploying, TriggerPhase::Idle).is_err());
        assert!(allowed_transitions(TriggerPhase::Succeeded).contains(&TriggerPhase::Idle));
    }

    #[test]
    fn gate_order() {
        let snapshot = ConfigDiffSnapshot::default();
        let mat = Material::new(1, "a", 0);
        let mut gate = TriggerGate {
            selected: None,
            are_materials_passing_filters: true,
            is_rollback_trigger: false,
            config_to_deploy: DeployConfigOption::LastSaved,
            config_diff: &snapshot,
            can_approver_deploy: false,
            trigger_blocked: false,
        };
        assert_eq!(gate.blocked_reason(), Some(TriggerError::NoSelection));

        gate.selected = Some(&mat);
        assert_eq!(gate.blocked_reason(), None);

        gate.is_rollback_trigger = true;
        assert_eq!(gate.blocked_reason(), Some(TriggerError::ConfigLoading));

        gate.are_materials_passing_filters = false;
        assert_eq!(gate.blocked_reason(), Some(TriggerError::FiltersNotPassing));
    }

    #[test]
    fn gate_rejects_own_approval() {
        let snapshot = ConfigDiffSnapshot::default();
        let mat = Material::new(1, "a", 0)
            .with_approval(ApprovalRecord::approved().approved_by_current_user());
        let gate = TriggerGate {
            selected: Some(&mat),
            are_materials_passing_filters: true,
            is_rollback_trigger: false,
            config_to_deploy: DeployConfigOption::LastSaved,
            config_diff: &snapshot,
            can_approver_deploy: false,
            trigger_blocked: false,
        };
        assert_eq!(gate.blocked_reason(), Some(TriggerError::ApproverCannotDeploy));
        let allowed = TriggerGate {
            can_approver_deploy: true,
            ..gate
        };
        assert!(!allowed.is_deploy_disabled());
    }

    #[tokio::test]
    async fn success_toasts_and_returns_to_idle() {
        let mut service = MockDeployService::new();
        service
            .expect_trigger_deploy()
            .times(1)
            .returning(|_, _| Ok(DeployResponse::default()));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|t| t.description == DEPLOYMENT_INITIATED)
            .times(1)
            .return_const(());

        let controller = TriggerController::new();
        controller.begin().unwrap();
        let result = controller
            .deploy(request(), &PipelineTarget::new(1, 2, 3), &service, &notifier)
            .await
            .unwrap();
        assert!(matches!(result, DeployResult::Succeeded { .. }));
        assert_eq!(controller.phase(), TriggerPhase::Idle);
        assert_eq!(controller.last_terminal(), Some(TriggerPhase::Succeeded));
        assert!(!controller.is_deploying());
    }

    #[test]
    fn manifest_push_errors_become_item_toasts() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|t| {
                t.action.as_ref().is_some_and(|a| a.href == "/app/1/cd-details/2/3")
                    && !t.auto_close
            })
            .times(2)
            .return_const(());
        notifier.expect_show_error().never();

        let err = ServiceError::from(ServerErrors::new(
            422,
            vec![ServerErrorItem::user("chart push failed"), ServerErrorItem::internal("oci 500")],
        ));
        present_deploy_error(&err, &push_target(), &notifier);
    }

    #[test]
    fn forbidden_falls_back_to_generic_error() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        notifier.expect_show_error().times(1).return_const(());

        let err = ServiceError::from(ServerErrors::new(
            403,
            vec![ServerErrorItem::user("forbidden")],
        ));
        present_deploy_error(&err, &push_target(), &notifier);
    }

    #[test]
    fn aborted_is_silent() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        notifier.expect_show_error().never();
        present_deploy_error(&ServiceError::Aborted, &push_target(), &notifier);
        present_deploy_error(&ServiceError::Aborted, &PipelineTarget::default(), &notifier);
    }
}
