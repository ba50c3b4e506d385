use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Named groups of file extensions that count as deployable source.
///
/// Changes inside a watched folder only trigger a deploy when the file's
/// extension belongs to one of the groups. An empty set accepts every file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SelectionFilters {
    groups: BTreeMap<String, Vec<String>>,
}

/// Extension groups recognised in a Salesforce DX source tree.
const DEFAULT_GROUPS: &[(&str, &[&str])] = &[
    ("scripts", &["js", "ts"]),
    ("markup", &["html", "page", "component"]),
    ("styles", &["css"]),
    ("classes", &["cls", "trigger"]),
    (
        "components",
        &["cmp", "app", "evt", "intf", "design", "auradoc", "svg"],
    ),
    ("data", &["xml", "json"]),
];

impl Default for SelectionFilters {
    fn default() -> Self {
        let groups = DEFAULT_GROUPS
            .iter()
            .map(|(name, exts)| {
                (
                    (*name).to_owned(),
                    exts.iter().map(|e| (*e).to_owned()).collect(),
                )
            })
            .collect();
        Self { groups }
    }
}

impl SelectionFilters {
    /// A filter set that accepts every file.
    pub fn accept_all() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Name of the first group whose extensions include `path`'s extension.
    /// Extensions are compared case-insensitively, with or without a leading dot.
    pub fn group_for(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.groups.iter().find_map(|(name, exts)| {
            exts.iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
                .then_some(name.as_str())
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.is_empty() || self.group_for(path).is_some()
    }
}
