//! Console configuration injected into the session
//!
//! Feature flags are passed in explicitly; core logic never reads process
//! globals. Sources:
//! - TOML text via [`ConsoleConfig::from_toml_str`]
//! - a key/value map via [`ConsoleConfig::from_env_map`]

use crate::error::ConfigError;
use crate::types::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const KEY_RESOURCE_SCAN_V2: &str = "ENABLE_RESOURCE_SCAN_V2";
const KEY_HIDE_GITOPS_OR_HELM: &str = "HIDE_GITOPS_OR_HELM_OPTION";
const KEY_BANNER: &str = "ANNOUNCEMENT_BANNER_MSG";
const KEY_PAGE_SIZE: &str = "CD_MATERIAL_PAGE_SIZE";

/// Console-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Pass-through for the host's scan panels; the session does not read it
    pub enable_resource_scan_v2: bool,
    /// Pass-through for pipeline editors; the session does not read it
    pub hide_gitops_or_helm_option: bool,
    /// See [`CdMaterialSession::announcement_banner`](crate::CdMaterialSession::announcement_banner)
    pub announcement_banner_msg: Option<String>,
    /// Materials per page for initial load and "load older"
    pub page_size: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enable_resource_scan_v2: false,
            hide_gitops_or_helm_option: false,
            announcement_banner_msg: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ConsoleConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With resource scan v2
    #[inline]
    #[must_use]
    pub fn with_resource_scan_v2(mut self, enabled: bool) -> Self {
        self.enable_resource_scan_v2 = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_hide_gitops_or_helm_option(mut self, hide: bool) -> Self {
        self.hide_gitops_or_helm_option = hide;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_announcement_banner(mut self, msg: impl Into<String>) -> Self {
        self.announcement_banner_msg = Some(msg.into());
        self
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Parse from TOML text; missing keys take defaults
    ///
    /// # Errors
    /// [`ConfigError::Toml`] for malformed text, [`ConfigError::InvalidPageSize`]
    /// for a zero page size.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()
    }

    /// Build from upper-case flag keys
    ///
    /// # Errors
    /// [`ConfigError::InvalidFlag`] when a boolean or numeric flag does not
    /// parse.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = vars.get(KEY_RESOURCE_SCAN_V2) {
            config.enable_resource_scan_v2 = parse_flag(KEY_RESOURCE_SCAN_V2, v)?;
        }
        if let Some(v) = vars.get(KEY_HIDE_GITOPS_OR_HELM) {
            config.hide_gitops_or_helm_option = parse_flag(KEY_HIDE_GITOPS_OR_HELM, v)?;
        }
        config.announcement_banner_msg = vars
            .get(KEY_BANNER)
            .filter(|msg| !msg.trim().is_empty())
            .cloned();
        if let Some(v) = vars.get(KEY_PAGE_SIZE) {
            config.page_size = v.trim().parse().map_err(|_| ConfigError::InvalidFlag {
                key: KEY_PAGE_SIZE.to_string(),
                value: v.clone(),
            })?;
        }
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.page_size, 20);
        assert!(!config.enable_resource_scan_v2);
        assert!(config.announcement_banner_msg.is_none());
    }

    #[test]
    fn toml_partial_override() {
        let config = ConsoleConfig::from_toml_str(
            r#"
            enable_resource_scan_v2 = true
            announcement_banner_msg = "maintenance tonight"
            "#,
        )
        .unwrap();
        assert!(config.enable_resource_scan_v2);
        assert_eq!(config.page_size, 20);
        assert_eq!(
            config.announcement_banner_msg.as_deref(),
            Some("maintenance tonight")
        );
    }

    #[test]
    fn toml_rejects_zero_page_size() {
        let err = ConsoleConfig::from_toml_str("page_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPageSize));
    }

    #[test]
    fn env_map_flags() {
        let config = ConsoleConfig::from_env_map(&vars(&[
            ("ENABLE_RESOURCE_SCAN_V2", "true"),
            ("HIDE_GITOPS_OR_HELM_OPTION", "0"),
            ("ANNOUNCEMENT_BANNER_MSG", "  "),
        ]))
        .unwrap();
        assert!(config.enable_resource_scan_v2);
        assert!(!config.hide_gitops_or_helm_option);
        assert!(config.announcement_banner_msg.is_none());
    }

    #[test]
    fn env_map_bad_flag() {
        let err = ConsoleConfig::from_env_map(&vars(&[("ENABLE_RESOURCE_SCAN_V2", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));
    }
}
