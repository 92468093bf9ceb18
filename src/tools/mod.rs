pub mod base;
pub mod gobuster;
pub mod masscan;
pub mod nmap;
pub mod registry;
pub mod sqlmap;

pub use base::{
    ErrorContext, ErrorKind, PreparedCommand, Tool, ToolInfo, ToolInput, ToolOutput,
};
pub use registry::ToolRegistry;

use crate::config::Config;
use std::sync::Arc;

/// The compile-time tool catalog: one constructor per supported scanner.
/// Discovery-by-introspection was deliberately replaced with this list.
pub fn build_tools(config: &Config) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(nmap::NmapTool::new(config)),
        Arc::new(masscan::MasscanTool::new(config)),
        Arc::new(gobuster::GobusterTool::new(config)),
        Arc::new(sqlmap::SqlmapTool::new(config)),
    ]
}
