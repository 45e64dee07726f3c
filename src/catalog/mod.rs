//! Policy catalog — the authoritative set of command specifications,
//! grouped into plugins by command family.
//!
//! Plugins are ordinary values built by a compile-time registration list;
//! the catalog is loaded once at startup and immutable afterwards. Lookup
//! is first-match-wins: within a plugin the first whitespace-delimited
//! token is probed as a direct key before a declaration-order pattern scan,
//! and across plugins registration order wins.

mod containers;
mod filesystem;
mod monitoring;
mod network;
mod posix_process;
mod posix_system;
mod posix_text;
mod systemd;

use std::sync::OnceLock;

use regex::Regex;
use serde_derive::Serialize;

use crate::authorize::{AuthLevel, SshRole};
use crate::classify::RiskLevel;
use crate::error::{Error, Result};

/// Specification for a single command in a plugin.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Anchored regular expression (`^...$` or `^...(\s[^|;&>]*)?$`).
    pub pattern: Regex,
    pub risk: RiskLevel,
    pub level: AuthLevel,
    pub role: SshRole,
    pub description: String,
    pub rationale: String,
    pub examples: Vec<String>,
    pub flags: Vec<String>,
}

impl CommandSpec {
    /// Constructor for built-in specs. Patterns are literals; an invalid
    /// one is a programming error caught by the catalog tests.
    pub(crate) fn builtin(
        pattern: &str,
        risk: RiskLevel,
        level: AuthLevel,
        role: SshRole,
        description: &str,
        rationale: &str,
    ) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("builtin command pattern"),
            risk,
            level,
            role,
            description: description.to_string(),
            rationale: rationale.to_string(),
            examples: Vec::new(),
            flags: Vec::new(),
        }
    }

    pub(crate) fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub(crate) fn with_flags(mut self, flags: &[&str]) -> Self {
        self.flags = flags.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Check if a command string matches this spec.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }
}

/// A named group of related command specs.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    pub name: String,
    pub category: String,
    pub description: String,
    /// Ordered mapping of command key → spec. Declaration order is part of
    /// the contract: the first matching spec wins.
    pub commands: Vec<(String, CommandSpec)>,
}

impl CommandPlugin {
    pub(crate) fn new(name: &str, category: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            commands: Vec::new(),
        }
    }

    pub(crate) fn command(mut self, key: &str, spec: CommandSpec) -> Self {
        self.commands.push((key.to_string(), spec));
        self
    }

    /// Locate the spec for a command string. Probes the first token as a
    /// direct key, then falls back to scanning every spec in order.
    #[must_use]
    pub fn find(&self, command: &str) -> Option<&CommandSpec> {
        if let Some(token) = command.split_whitespace().next() {
            if let Some((_, spec)) = self.commands.iter().find(|(key, _)| key == token) {
                if spec.matches(command) {
                    return Some(spec);
                }
            }
        }
        self.commands
            .iter()
            .map(|(_, spec)| spec)
            .find(|spec| spec.matches(command))
    }

    /// All command keys in this plugin, in declaration order.
    #[must_use]
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|(key, _)| key.as_str()).collect()
    }

    #[must_use]
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            command_count: self.commands.len(),
            commands: self
                .commands
                .iter()
                .map(|(key, spec)| SpecView::new(key, spec))
                .collect(),
        }
    }
}

/// Serializable view of a spec, for reflection tools.
#[derive(Debug, Clone, Serialize)]
pub struct SpecView {
    pub command: String,
    pub pattern: String,
    pub risk: RiskLevel,
    pub level: AuthLevel,
    pub ssh_role: SshRole,
    pub description: String,
    pub rationale: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl SpecView {
    fn new(key: &str, spec: &CommandSpec) -> Self {
        Self {
            command: key.to_string(),
            pattern: spec.pattern.as_str().to_string(),
            risk: spec.risk,
            level: spec.level,
            ssh_role: spec.role,
            description: spec.description.clone(),
            rationale: spec.rationale.clone(),
            examples: spec.examples.clone(),
            flags: spec.flags.clone(),
        }
    }
}

/// Serializable plugin summary.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub category: String,
    pub description: String,
    pub command_count: usize,
    pub commands: Vec<SpecView>,
}

/// Serializable catalog summary.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub total_plugins: usize,
    pub total_commands: usize,
    pub categories: Vec<String>,
    pub plugins: Vec<PluginSummary>,
}

/// The plugin registry. Immutable after construction.
#[derive(Debug, Default)]
pub struct Catalog {
    plugins: Vec<CommandPlugin>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Register a plugin.
    ///
    /// # Errors
    /// Returns a policy error if the name is already present, or if a spec
    /// violates the level/role invariant (AUTO read-only specs bind to the
    /// reader, MANUAL to the executor, BLOCKED to no role).
    pub fn register(&mut self, plugin: CommandPlugin) -> Result<()> {
        if self.plugins.iter().any(|p| p.name == plugin.name) {
            return Err(Error::Policy(format!(
                "plugin '{}' already registered",
                plugin.name
            )));
        }
        for (key, spec) in &plugin.commands {
            let ok = match spec.level {
                AuthLevel::Auto => !(spec.risk == RiskLevel::Low && spec.role != SshRole::Reader),
                AuthLevel::Manual => spec.role == SshRole::Executor,
                AuthLevel::Blocked => spec.role == SshRole::None,
            };
            if !ok {
                return Err(Error::Policy(format!(
                    "spec '{}/{}' violates the level/role invariant",
                    plugin.name, key
                )));
            }
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Build the catalog with the fixed built-in plugin set.
    ///
    /// # Errors
    /// Returns an error if the registration list contains a duplicate or an
    /// invariant-violating spec.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        catalog.register(monitoring::plugin())?;
        catalog.register(network::plugin())?;
        catalog.register(filesystem::plugin())?;
        catalog.register(systemd::plugin())?;
        catalog.register(containers::plugin())?;
        catalog.register(posix_system::plugin())?;
        catalog.register(posix_process::plugin())?;
        catalog.register(posix_text::plugin())?;
        Ok(catalog)
    }

    /// Lazy process-wide instance, for the outermost boundary only.
    /// Construction is compute-once and thread-safe.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<Catalog> = OnceLock::new();
        SHARED.get_or_init(|| Self::builtin().expect("builtin catalog is valid"))
    }

    /// Find the first matching `(plugin, spec)` across plugins in
    /// registration order.
    #[must_use]
    pub fn find(&self, command: &str) -> Option<(&CommandPlugin, &CommandSpec)> {
        for plugin in &self.plugins {
            if let Some(spec) = plugin.find(command) {
                return Some((plugin, spec));
            }
        }
        None
    }

    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&CommandPlugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn plugins(&self) -> &[CommandPlugin] {
        &self.plugins
    }

    /// Case-insensitive substring search over command keys, descriptions,
    /// and rationales.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(&str, &CommandPlugin, &CommandSpec)> {
        let query = query.to_lowercase();
        let mut results = Vec::new();
        for plugin in &self.plugins {
            for (key, spec) in &plugin.commands {
                if key.to_lowercase().contains(&query)
                    || spec.description.to_lowercase().contains(&query)
                    || spec.rationale.to_lowercase().contains(&query)
                {
                    results.push((key.as_str(), plugin, spec));
                }
            }
        }
        results
    }

    /// All commands in a category, across plugins.
    #[must_use]
    pub fn commands_by_category(&self, category: &str) -> Vec<(&str, &CommandSpec)> {
        self.plugins
            .iter()
            .filter(|p| p.category == category)
            .flat_map(|p| p.commands.iter().map(|(key, spec)| (key.as_str(), spec)))
            .collect()
    }

    /// Unique categories in registration order.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut categories = Vec::new();
        for plugin in &self.plugins {
            if !categories.contains(&plugin.category) {
                categories.push(plugin.category.clone());
            }
        }
        categories
    }

    #[must_use]
    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            total_plugins: self.plugins.len(),
            total_commands: self.plugins.iter().map(|p| p.commands.len()).sum(),
            categories: self.categories(),
            plugins: self.plugins.iter().map(CommandPlugin::summary).collect(),
        }
    }
}
