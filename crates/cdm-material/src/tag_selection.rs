//! Selecting a material by release tag (bulk deploy)

use crate::material::Material;

/// Pseudo-tag selecting the newest material
pub const LATEST_IMAGE_TAG: &str = "latest";
/// Pseudo-tag selecting the currently deployed material
pub const ACTIVE_IMAGE_TAG: &str = "active";

const MAX_TAG_DISPLAY_LEN: usize = 15;

/// Outcome of [`select_by_tag`]
#[derive(Debug, Clone, PartialEq)]
pub struct TagSelection {
    pub materials: Vec<Material>,
    /// Set when the tag could not be resolved to a deployable material
    pub warning: Option<String>,
}

/// Select the material matching `tag_name`
///
/// Every material is first marked selected or not by the tag rules. When
/// the resolved material is missing, vulnerable or excluded by filters, a
/// warning is returned and no material stays selected.
#[must_use]
pub fn select_by_tag(tag_name: &str, materials: &[Material]) -> TagSelection {
    let mut updated: Vec<Material> = materials
        .iter()
        .enumerate()
        .map(|(position, mat)| {
            let mut mat = mat.clone();
            mat.is_selected = (tag_name == LATEST_IMAGE_TAG && position == 0)
                || (tag_name == ACTIVE_IMAGE_TAG && mat.is_consumed_pin())
                || mat.image_release_tags.iter().any(|t| t.tag_name == tag_name);
            mat
        })
        .collect();

    let selected = updated.iter().position(|m| m.is_selected);
    let warning = tag_warning(selected.map(|i| &updated[i]), tag_name);

    // keep only the first match selected
    if let Some(first) = selected {
        for mat in updated.iter_mut().skip(first + 1) {
            mat.is_selected = false;
        }
        if warning.is_some() {
            updated[first].is_selected = false;
        }
    }

    TagSelection {
        materials: updated,
        warning,
    }
}

fn tag_warning(selected: Option<&Material>, tag_name: &str) -> Option<String> {
    let display = display_tag(tag_name);
    match selected {
        None => Some(format!("Tag {display} is not present")),
        Some(mat) if mat.vulnerable => Some(format!("Tag {display} has vulnerabilities")),
        Some(mat) if !mat.filter_state.is_allowed() => {
            Some(format!("Tag {display} is not eligible for deployment"))
        }
        Some(_) => None,
    }
}

fn display_tag(tag_name: &str) -> String {
    if tag_name.chars().count() > MAX_TAG_DISPLAY_LEN {
        let truncated: String = tag_name.chars().take(MAX_TAG_DISPLAY_LEN).collect();
        format!("{truncated}...")
    } else {
        tag_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::FilterState;

    fn fixture() -> Vec<Material> {
        vec![
            Material::new(1, "newest", 0).with_tags(["v3"]),
            Material::new(2, "running", 1).deployed_latest().with_tags(["v2"]),
            Material::new(3, "old", 2).with_tags(["v1"]).vulnerable(),
            Material::new(4, "blocked", 3)
                .with_tags(["v0"])
                .with_filter_state(FilterState::Blocked),
        ]
    }

    fn selected_ids(sel: &TagSelection) -> Vec<u64> {
        sel.materials.iter().filter(|m| m.is_selected).map(|m| m.id).collect()
    }

    #[test]
    fn pseudo_tags() {
        let latest = select_by_tag(LATEST_IMAGE_TAG, &fixture());
        assert_eq!(selected_ids(&latest), vec![1]);
        assert!(latest.warning.is_none());

        let active = select_by_tag(ACTIVE_IMAGE_TAG, &fixture());
        assert_eq!(selected_ids(&active), vec![2]);
    }

    #[test]
    fn release_tag_match() {
        let sel = select_by_tag("v2", &fixture());
        assert_eq!(selected_ids(&sel), vec![2]);
    }

    #[test]
    fn warnings_deselect() {
        let missing = select_by_tag("v9", &fixture());
        assert_eq!(missing.warning.as_deref(), Some("Tag v9 is not present"));

        let vulnerable = select_by_tag("v1", &fixture());
        assert_eq!(vulnerable.warning.as_deref(), Some("Tag v1 has vulnerabilities"));
        assert!(selected_ids(&vulnerable).is_empty());

        let blocked = select_by_tag("v0", &fixture());
        assert_eq!(
            blocked.warning.as_deref(),
            Some("Tag v0 is not eligible for deployment")
        );
        assert!(selected_ids(&blocked).is_empty());
    }

    #[test]
    fn long_tag_names_are_truncated() {
        let sel = select_by_tag("release-2024-10-01-hotfix", &fixture());
        assert_eq!(
            sel.warning.as_deref(),
            Some("Tag release-2024-10... is not present")
        );
    }
}
