//! Immutable catalog lookup table.
//!
//! [`CatalogIndex`] is built once at startup from [`CatalogData`] and then
//! shared by reference (usually behind an `Arc`) with every component that
//! needs command metadata or card templates. It has no mutating methods.

use std::collections::BTreeMap;

use strategos_types::{CapabilityGroup, Faction};

use crate::error::CatalogError;
use crate::fragments::{CardTemplate, CatalogData, CatalogSources, CommandEntry};

/// Read-only index over the command catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    /// Catalog version string.
    version: String,
    /// Command metadata by code.
    commands: BTreeMap<String, CommandEntry>,
    /// Templates by id.
    templates: BTreeMap<String, CardTemplate>,
    /// Shortcut key to command code.
    shortcuts: BTreeMap<String, String>,
}

impl CatalogIndex {
    /// Build the index from loaded fragments.
    ///
    /// Templates or shortcuts that reference unknown command codes are kept
    /// but logged, since the commands fragment may legitimately be absent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateTemplate`] or
    /// [`CatalogError::DuplicateShortcut`] when ids collide.
    pub fn build(data: CatalogData) -> Result<Self, CatalogError> {
        let CatalogData {
            commands,
            authority_cards,
            shortcuts,
        } = data;

        let mut templates = BTreeMap::new();
        for template in authority_cards {
            for code in &template.command_codes {
                if !commands.commands.contains_key(code) {
                    tracing::warn!(
                        template = template.id,
                        code,
                        "Card template references a command missing from the catalog"
                    );
                }
            }
            let id = template.id.clone();
            if templates.insert(id.clone(), template).is_some() {
                return Err(CatalogError::DuplicateTemplate(id));
            }
        }

        let mut shortcut_map = BTreeMap::new();
        for shortcut in shortcuts {
            if !commands.commands.contains_key(&shortcut.command_code) {
                tracing::warn!(
                    key = shortcut.key,
                    code = shortcut.command_code,
                    "Shortcut references a command missing from the catalog"
                );
            }
            if shortcut_map
                .insert(shortcut.key.clone(), shortcut.command_code)
                .is_some()
            {
                return Err(CatalogError::DuplicateShortcut(shortcut.key));
            }
        }

        tracing::info!(
            version = commands.version,
            commands = commands.commands.len(),
            templates = templates.len(),
            shortcuts = shortcut_map.len(),
            "Catalog index built"
        );

        Ok(Self {
            version: commands.version,
            commands: commands.commands,
            templates,
            shortcuts: shortcut_map,
        })
    }

    /// Load fragments from disk and build the index.
    ///
    /// # Errors
    ///
    /// Propagates fragment load errors and index build errors.
    pub fn load(sources: &CatalogSources) -> Result<Self, CatalogError> {
        Self::build(CatalogData::load(sources)?)
    }

    /// Catalog version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Metadata for a command code.
    pub fn command(&self, code: &str) -> Option<&CommandEntry> {
        self.commands.get(code)
    }

    /// Capability group of a command code.
    pub fn group_of(&self, code: &str) -> Option<CapabilityGroup> {
        self.commands.get(code).map(|c| c.group)
    }

    /// Template by id.
    pub fn template(&self, id: &str) -> Option<&CardTemplate> {
        self.templates.get(id)
    }

    /// Templates provisioned for `faction`: its own plus shared ones, in
    /// id order.
    pub fn templates_for(&self, faction: Faction) -> impl Iterator<Item = &CardTemplate> {
        self.templates
            .values()
            .filter(move |t| t.faction.applies_to(faction))
    }

    /// Command code bound to a shortcut key.
    pub fn resolve_shortcut(&self, key: &str) -> Option<&str> {
        self.shortcuts.get(key).map(String::as_str)
    }

    /// Number of command codes.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}
