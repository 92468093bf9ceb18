mod loader;
mod schema;

pub use loader::load_config;
pub use schema::{
    BreakerSettings, Config, HealthConfig, MetricsConfig, SecurityConfig, ServerConfig, ToolConfig,
    Transport,
};
