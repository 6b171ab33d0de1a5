//! Toast notifications emitted by the session

use serde::{Deserialize, Serialize};

/// Text of the deep-link action on manifest-push failures
pub const VIEW_DETAILS: &str = "View details";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Success,
    Info,
    Warning,
    Error,
}

/// Button attached to a toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastAction {
    pub text: String,
    /// Route navigated to on click
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub variant: ToastVariant,
    pub description: String,
    pub action: Option<ToastAction>,
    /// `false` keeps the toast until dismissed
    pub auto_close: bool,
}

impl Toast {
    #[must_use]
    pub fn new(variant: ToastVariant, description: impl Into<String>) -> Self {
        Self {
            variant,
            description: description.into(),
            action: None,
            auto_close: true,
        }
    }

    #[must_use]
    pub fn success(description: impl Into<String>) -> Self {
        Self::new(ToastVariant::Success, description)
    }

    #[must_use]
    pub fn info(description: impl Into<String>) -> Self {
        Self::new(ToastVariant::Info, description)
    }

    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self::new(ToastVariant::Error, description)
    }

    /// With a "View details" style action
    #[inline]
    #[must_use]
    pub fn with_action(mut self, text: impl Into<String>, href: impl Into<String>) -> Self {
        self.action = Some(ToastAction {
            text: text.into(),
            href: href.into(),
        });
        self
    }

    /// Keep the toast until the user dismisses it
    #[inline]
    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.auto_close = false;
        self
    }
}
