use crate::tools::base::{Tool, ToolInfo};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// One row of the `/tools` introspection payload.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListing {
    pub enabled: bool,
    #[serde(flatten)]
    pub info: ToolInfo,
}

/// Holds the constructed tools and the enabled subset. The tool set is
/// fixed at startup; only the enabled set mutates, under a short lock.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    enabled: RwLock<HashSet<String>>,
}

impl ToolRegistry {
    /// Enable predicate: a non-empty include list is a whitelist; the
    /// exclude list always wins.
    pub fn new(tools: Vec<Arc<dyn Tool>>, include: &[String], exclude: &[String]) -> Self {
        let mut map: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        let mut enabled: HashSet<String> = HashSet::new();

        for tool in tools {
            let name = tool.name().to_string();
            if map.contains_key(&name) {
                warn!("tool_registry.duplicate_tool name={}", name);
            }
            let is_enabled = (include.is_empty() || include.iter().any(|n| n == &name))
                && !exclude.iter().any(|n| n == &name);
            if is_enabled {
                enabled.insert(name.clone());
                info!("tool_registry.tool_registered name={} enabled=true", name);
            } else {
                info!("tool_registry.tool_registered name={} enabled=false", name);
            }
            map.insert(name, tool);
        }

        Self {
            tools: map,
            enabled: RwLock::new(enabled),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(name)
    }

    /// Enable a tool. Returns false for unknown names.
    pub fn enable(&self, name: &str) -> bool {
        if !self.tools.contains_key(name) {
            return false;
        }
        self.enabled
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string());
        info!("tool_registry.enabled name={}", name);
        true
    }

    /// Disable a tool. Returns false for unknown names.
    pub fn disable(&self, name: &str) -> bool {
        if !self.tools.contains_key(name) {
            return false;
        }
        self.enabled
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name);
        info!("tool_registry.disabled name={}", name);
        true
    }

    /// Sorted names of all registered tools.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn enabled_tools(&self) -> Vec<Arc<dyn Tool>> {
        let enabled = self
            .enabled
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut tools: Vec<Arc<dyn Tool>> = self
            .tools
            .iter()
            .filter(|(name, _)| enabled.contains(*name))
            .map(|(_, tool)| tool.clone())
            .collect();
        tools.sort_by_key(|t| t.name());
        tools
    }

    pub fn counts(&self) -> (usize, usize) {
        let enabled = self
            .enabled
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        (enabled, self.tools.len())
    }

    /// Introspection snapshot of every tool, sorted by name.
    pub fn listings(&self) -> Vec<ToolListing> {
        let enabled = self
            .enabled
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut listings: Vec<ToolListing> = self
            .tools
            .values()
            .map(|tool| ToolListing {
                enabled: enabled.contains(tool.name()),
                info: tool.info(),
            })
            .collect();
        listings.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        listings
    }
}

#[cfg(test)]
mod tests;
