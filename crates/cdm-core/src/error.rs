//! Error types for the selection session
//!
//! - [`ServiceError`]: what collaborators return at the service boundary
//! - [`ErrorKind`]: the closed user-facing taxonomy derived from any error
//! - [`FetchError`], [`TriggerError`], [`ConfigError`], [`SessionError`]:
//!   per-component failures with classification helpers

use cdm_material::ListError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP-like status codes the trigger path treats as plain errors
pub const CODE_FORBIDDEN: u16 = 403;
pub const CODE_REQUEST_TIMEOUT: u16 = 408;

/// User-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Request superseded or cancelled; never shown
    Aborted,
    /// Client-side precondition failed; shown as a toast, no request issued
    Validation,
    /// Server error carrying per-item messages
    StructuredServer,
    /// Anything else; shown through the global error presenter
    Generic,
}

/// One entry of a structured server error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub internal_message: Option<String>,
}

impl ServerErrorItem {
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            user_message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            internal_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// User message, falling back to the internal message
    #[must_use]
    pub fn message(&self) -> &str {
        self.user_message
            .as_deref()
            .or(self.internal_message.as_deref())
            .unwrap_or_default()
    }
}

/// Structured server error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrors {
    pub code: u16,
    #[serde(default)]
    pub errors: Vec<ServerErrorItem>,
}

impl ServerErrors {
    #[must_use]
    pub fn new(code: u16, errors: Vec<ServerErrorItem>) -> Self {
        Self { code, errors }
    }

    /// 403 and 408 never produce per-item toasts
    #[inline]
    #[must_use]
    pub fn is_forbidden_or_timeout(&self) -> bool {
        self.code == CODE_FORBIDDEN || self.code == CODE_REQUEST_TIMEOUT
    }
}

impl fmt::Display for ServerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server error {}", self.code)?;
        if let Some(first) = self.errors.first() {
            write!(f, ": {}", first.message())?;
        }
        Ok(())
    }
}

/// Error returned by every collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request's cancellation token fired
    #[error("request aborted")]
    Aborted,

    #[error("{0}")]
    Server(ServerErrors),

    /// Network failure or malformed response
    #[error("transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Aborted => ErrorKind::Aborted,
            Self::Server(s) if !s.errors.is_empty() => ErrorKind::StructuredServer,
            Self::Server(_) | Self::Transport(_) => ErrorKind::Generic,
        }
    }

    /// Structured payload, if any
    #[inline]
    #[must_use]
    pub fn server_errors(&self) -> Option<&ServerErrors> {
        match self {
            Self::Server(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ServerErrors> for ServiceError {
    fn from(value: ServerErrors) -> Self {
        Self::Server(value)
    }
}

/// Material fetcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("material service failed: {0}")]
    Service(#[from] ServiceError),

    /// No pipeline id to fetch for
    #[error("pipeline id missing")]
    MissingPipeline,
}

impl FetchError {
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_aborted())
    }

    #[inline]
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !self.is_aborted()
    }
}

/// Identifiers missing from a deploy attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingIds {
    pub app_id: bool,
    pub pipeline_id: bool,
    pub artifact_id: bool,
}

impl MissingIds {
    #[inline]
    #[must_use]
    pub fn any(self) -> bool {
        self.app_id || self.pipeline_id || self.artifact_id
    }

    /// Toast text listing what is missing
    #[must_use]
    pub fn message(self) -> String {
        let mut message = String::new();
        if self.app_id {
            message.push_str("app id missing ");
        }
        if self.pipeline_id {
            message.push_str("pipeline id missing ");
        }
        if self.artifact_id {
            message.push_str("Artifact id missing ");
        }
        message
    }
}

impl fmt::Display for MissingIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().trim_end())
    }
}

/// Deployment trigger errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("runtime parameters have errors")]
    RuntimeParamsInvalid,

    #[error("{0}")]
    MissingIds(MissingIds),

    #[error("no material selected")]
    NoSelection,

    #[error("no material passes the configured filters")]
    FiltersNotPassing,

    #[error("deployment configuration is still loading")]
    ConfigLoading,

    #[error("selected deployment configuration is not available")]
    ConfigUnavailable,

    #[error("no previous deployment configuration exists")]
    NoLastDeploymentConfig,

    #[error("image approver cannot deploy their own approval")]
    ApproverCannotDeploy,

    #[error("trigger blocked by policy")]
    TriggerBlocked,

    /// A deploy for this session is already in flight
    #[error("deployment already in progress")]
    AlreadyDeploying,

    #[error("no deployment window confirmation pending")]
    NoPendingConfirmation,

    #[error("illegal trigger transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: crate::trigger::TriggerPhase,
        to: crate::trigger::TriggerPhase,
    },

    #[error("deploy request failed: {0}")]
    Service(#[from] ServiceError),
}

impl TriggerError {
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_aborted())
    }

    /// Preconditions that keep the deploy button disabled
    #[must_use]
    pub fn is_disabled_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoSelection
                | Self::FiltersNotPassing
                | Self::ConfigLoading
                | Self::ConfigUnavailable
                | Self::NoLastDeploymentConfig
                | Self::ApproverCannotDeploy
                | Self::TriggerBlocked
        )
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(e) => e.kind(),
            Self::IllegalTransition { .. } => ErrorKind::Generic,
            _ => ErrorKind::Validation,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Aborted)
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidFlag { key: String, value: String },

    #[error("page size must be positive")]
    InvalidPageSize,
}

/// Top-level session error
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Material cannot be selected (excluded, vulnerable or not approved)
    #[error("material {index} is not selectable")]
    NotSelectable { index: usize },

    #[error("materials not loaded")]
    NotLoaded,
}

impl SessionError {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_aborted(),
            Self::Trigger(e) => e.is_aborted(),
            _ => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !self.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_kinds() {
        assert_eq!(ServiceError::Aborted.kind(), ErrorKind::Aborted);
        assert_eq!(
            ServiceError::Transport("reset".into()).kind(),
            ErrorKind::Generic
        );
        let structured = ServiceError::from(ServerErrors::new(
            422,
            vec![ServerErrorItem::user("image digest mismatch")],
        ));
        assert_eq!(structured.kind(), ErrorKind::StructuredServer);
        assert_eq!(
            ServiceError::from(ServerErrors::new(500, vec![])).kind(),
            ErrorKind::Generic
        );
    }

    #[test]
    fn item_message_falls_back_to_internal() {
        assert_eq!(ServerErrorItem::internal("boom").message(), "boom");
        let both = ServerErrorItem {
            user_message: Some("nice".into()),
            internal_message: Some("raw".into()),
            code: None,
        };
        assert_eq!(both.message(), "nice");
    }

    #[test]
    fn missing_ids_message_concatenates() {
        let ids = MissingIds {
            app_id: true,
            pipeline_id: false,
            artifact_id: true,
        };
        assert_eq!(ids.message(), "app id missing Artifact id missing ");
        assert!(ids.any());
        assert!(!MissingIds::default().any());
    }

    #[test]
    fn aborted_trigger_is_invisible() {
        let err = TriggerError::from(ServiceError::Aborted);
        assert!(err.is_aborted());
        assert!(!err.is_user_visible());
        assert!(TriggerError::RuntimeParamsInvalid.is_user_visible());
        assert!(TriggerError::NoSelection.is_disabled_precondition());
    }
}
