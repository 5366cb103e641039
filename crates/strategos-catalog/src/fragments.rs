//! Independently loadable catalog fragments.
//!
//! The catalog is assembled from three JSON files: commands, authority-card
//! templates, and shortcuts. Each is optional. A loader returns
//! `Ok(None)` when its file does not exist, and callers fall back to the
//! fragment's `Default` (an empty fragment). Only unreadable or malformed
//! files are errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strategos_types::{CapabilityGroup, CpCost, CpPool, FactionScope, Rank};

use crate::error::CatalogError;

/// Version reported when no commands fragment is present.
pub const EMPTY_CATALOG_VERSION: &str = "0";

/// Catalog metadata for a single command code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    /// Capability group driving dispatch.
    pub group: CapabilityGroup,
    /// Pool the flat cost is drawn from.
    #[serde(default)]
    pub cp_type: Option<CpPool>,
    /// Flat cost.
    #[serde(default)]
    pub cp_cost: Option<u32>,
    /// Display label.
    pub label: String,
    /// Manual reference.
    #[serde(default)]
    pub manual_ref: Option<String>,
    /// Default wait window for operations planned with this command.
    #[serde(default)]
    pub wait_hours: u32,
    /// Default execution window for operations planned with this command.
    #[serde(default)]
    pub execution_hours: u32,
}

impl CommandEntry {
    /// Flat catalog cost as a [`CpCost`]. A missing pool or amount is free.
    pub const fn cost(&self) -> CpCost {
        match (self.cp_type, self.cp_cost) {
            (Some(pool), Some(amount)) => CpCost::single(pool, amount),
            _ => CpCost {
                political: None,
                military: None,
            },
        }
    }
}

/// The commands fragment: a versioned map of code to metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsFragment {
    /// Catalog version; a change triggers card re-provisioning.
    #[serde(default = "default_version")]
    pub version: String,
    /// Command metadata by code.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandEntry>,
}

impl Default for CommandsFragment {
    fn default() -> Self {
        Self {
            version: default_version(),
            commands: BTreeMap::new(),
        }
    }
}

fn default_version() -> String {
    EMPTY_CATALOG_VERSION.to_owned()
}

/// An authority-card template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTemplate {
    /// Template id, unique across the catalog.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Category (fleet, ministry, staff, ...).
    #[serde(default)]
    pub category: String,
    /// Which factions receive this card.
    pub faction: FactionScope,
    /// Command codes granted.
    #[serde(default)]
    pub command_codes: Vec<String>,
    /// Capability groups granted.
    #[serde(default)]
    pub command_groups: Vec<CapabilityGroup>,
    /// Manual reference.
    #[serde(default)]
    pub manual_ref: Option<String>,
    /// Named permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Minimum rank required to execute commands with this card.
    #[serde(default = "default_min_rank")]
    pub min_rank: Rank,
    /// Organization the holder must belong to, if scoped.
    #[serde(default)]
    pub organization: Option<String>,
    /// Declared maximum holders.
    #[serde(default = "default_max_holders")]
    pub max_holders: u32,
}

const fn default_min_rank() -> Rank {
    Rank::Sublieutenant
}

const fn default_max_holders() -> u32 {
    1
}

/// A keyboard shortcut bound to a command code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    /// Shortcut key.
    pub key: String,
    /// Command code it invokes.
    pub command_code: String,
}

/// Paths of the three fragments. `None` means "not configured", which is
/// treated like a missing file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSources {
    /// Commands fragment path.
    pub commands: Option<PathBuf>,
    /// Authority-card templates fragment path.
    pub authority_cards: Option<PathBuf>,
    /// Shortcuts fragment path.
    pub shortcuts: Option<PathBuf>,
}

/// The three fragments after loading, each defaulted when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogData {
    /// Commands and version.
    pub commands: CommandsFragment,
    /// Card templates.
    pub authority_cards: Vec<CardTemplate>,
    /// Shortcuts.
    pub shortcuts: Vec<Shortcut>,
}

impl CatalogData {
    /// Load every configured fragment, substituting the empty default for
    /// missing ones.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] or [`CatalogError::Parse`] if a fragment
    /// exists but cannot be read or parsed.
    pub fn load(sources: &CatalogSources) -> Result<Self, CatalogError> {
        let commands = load_optional::<CommandsFragment>(sources.commands.as_deref())?;
        let authority_cards = load_optional::<Vec<CardTemplate>>(sources.authority_cards.as_deref())?;
        let shortcuts = load_optional::<Vec<Shortcut>>(sources.shortcuts.as_deref())?;

        tracing::info!(
            commands_present = commands.is_some(),
            cards_present = authority_cards.is_some(),
            shortcuts_present = shortcuts.is_some(),
            "Catalog fragments loaded"
        );

        Ok(Self {
            commands: commands.unwrap_or_default(),
            authority_cards: authority_cards.unwrap_or_default(),
            shortcuts: shortcuts.unwrap_or_default(),
        })
    }
}

/// Load a fragment if a path is configured and the file exists.
fn load_optional<T: DeserializeOwned>(path: Option<&Path>) -> Result<Option<T>, CatalogError> {
    match path {
        Some(path) => load_fragment(path),
        None => Ok(None),
    }
}

/// Load one JSON fragment from disk.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns [`CatalogError::Io`] for any other read failure and
/// [`CatalogError::Parse`] for malformed content.
pub fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CatalogError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Catalog fragment absent, using empty default");
            return Ok(None);
        }
        Err(source) => {
            return Err(CatalogError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_fragment(&contents)
        .map(Some)
        .map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse a fragment from a JSON string.
///
/// # Errors
///
/// Returns the underlying JSON error when the content does not match `T`.
pub fn parse_fragment<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_fragment_is_none() {
        let path = std::env::temp_dir().join("strategos-no-such-fragment.json");
        let loaded = load_fragment::<CommandsFragment>(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn unconfigured_sources_load_empty_catalog() {
        let data = CatalogData::load(&CatalogSources::default()).unwrap();
        assert_eq!(data.commands.version, EMPTY_CATALOG_VERSION);
        assert!(data.commands.commands.is_empty());
        assert!(data.authority_cards.is_empty());
        assert!(data.shortcuts.is_empty());
    }

    #[test]
    fn malformed_fragment_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "strategos-bad-fragment-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        let result = load_fragment::<CommandsFragment>(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(CatalogError::Parse { .. })));
    }

    #[test]
    fn template_defaults_apply() {
        let json = r#"[{"id": "fleet_commander", "title": "Fleet Commander", "faction": "empire"}]"#;
        let templates: Vec<CardTemplate> = parse_fragment(json).unwrap();
        let template = templates.first().unwrap();
        assert_eq!(template.min_rank, Rank::Sublieutenant);
        assert_eq!(template.max_holders, 1);
        assert!(template.organization.is_none());
    }

    #[test]
    fn command_cost_requires_pool_and_amount() {
        let json = r#"{"version": "3", "commands": {
            "warp": {"group": "command", "cp_type": "military", "cp_cost": 40, "label": "Warp"},
            "salute": {"group": "personnel", "cp_cost": 5, "label": "Salute"}
        }}"#;
        let fragment: CommandsFragment = parse_fragment(json).unwrap();
        let warp = fragment.commands.get("warp").unwrap();
        assert_eq!(warp.cost().amount(CpPool::Military), 40);
        let salute = fragment.commands.get("salute").unwrap();
        assert!(salute.cost().is_free());
    }
}
