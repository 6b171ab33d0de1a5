//! Query-string surface of the trigger view
//!
//! Recognized parameters:
//! - `search`: image search text
//! - `deploy`: chosen deployment configuration option
//! - `mode`: `list` or `review-config`
//! - `sortBy` / `sortOrder`: config-diff ordering, dropped when leaving review
//!
//! Unknown parameters are preserved in order.

use crate::types::{DeployConfigOption, MaterialType};
use std::borrow::Cow;
use std::fmt;

pub const PARAM_SEARCH: &str = "search";
pub const PARAM_DEPLOY: &str = "deploy";
pub const PARAM_MODE: &str = "mode";
pub const PARAM_SORT_BY: &str = "sortBy";
pub const PARAM_SORT_ORDER: &str = "sortOrder";

/// Sub-view of the trigger modal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    List,
    ReviewConfig,
}

impl ViewMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::ReviewConfig => "review-config",
        }
    }
}

/// Ordered query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerQuery {
    params: Vec<(String, String)>,
}

impl TriggerQuery {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2`, with or without a leading `?`
    ///
    /// Undecodable pairs are kept verbatim.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let params = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(k), decode(v))
            })
            .collect();
        Self { params }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace a parameter, keeping its position
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.params.retain(|(k, _)| k != key);
    }

    #[must_use]
    pub fn search(&self) -> Option<&str> {
        self.get(PARAM_SEARCH).filter(|s| !s.is_empty())
    }

    /// Parsed `deploy` option; unknown values read as absent
    #[must_use]
    pub fn deploy(&self) -> Option<DeployConfigOption> {
        self.get(PARAM_DEPLOY).and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn mode(&self) -> ViewMode {
        match self.get(PARAM_MODE) {
            Some("review-config") => ViewMode::ReviewConfig,
            _ => ViewMode::List,
        }
    }

    /// Config diff is shown instead of the material list
    #[must_use]
    pub fn is_config_diff_view(&self) -> bool {
        self.mode() == ViewMode::ReviewConfig && self.get(PARAM_DEPLOY).is_some()
    }

    /// Set search text; empty text removes the parameter
    #[must_use]
    pub fn with_search(mut self, search: Option<&str>) -> Self {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => self.set(PARAM_SEARCH, s),
            None => self.remove(PARAM_SEARCH),
        }
        self
    }

    #[must_use]
    pub fn with_deploy(mut self, option: DeployConfigOption) -> Self {
        self.set(PARAM_DEPLOY, option.as_str());
        self
    }

    /// Switch sub-view; returning to the list drops config-diff sorting
    #[must_use]
    pub fn with_mode(mut self, mode: ViewMode) -> Self {
        self.set(PARAM_MODE, mode.as_str());
        if mode == ViewMode::List {
            self.remove(PARAM_SORT_ORDER);
            self.remove(PARAM_SORT_BY);
        }
        self
    }

    #[must_use]
    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for TriggerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => spaced,
    }
}

/// Config option selected when the view opens
#[must_use]
pub fn initial_config_to_deploy(material_type: MaterialType, query: &TriggerQuery) -> DeployConfigOption {
    let deploy = query.deploy();
    if (material_type.is_rollback() && query.get(PARAM_DEPLOY).is_none())
        || deploy == Some(DeployConfigOption::SpecificTrigger)
    {
        return DeployConfigOption::SpecificTrigger;
    }
    if deploy == Some(DeployConfigOption::LatestTrigger) {
        return DeployConfigOption::LatestTrigger;
    }
    DeployConfigOption::LastSaved
}

/// Raw `deploy` value to write back when entering review mode
#[must_use]
pub fn config_to_deploy_value(material_type: MaterialType, query: &TriggerQuery) -> String {
    if let Some(raw) = query.get(PARAM_DEPLOY).filter(|v| !v.is_empty()) {
        return raw.to_string();
    }
    if material_type.is_rollback() {
        DeployConfigOption::SpecificTrigger.as_str().to_string()
    } else {
        DeployConfigOption::LastSaved.as_str().to_string()
    }
}
