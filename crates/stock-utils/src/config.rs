//! Process-level application configuration

use serde::{Deserialize, Serialize};

/// Environment variable holding the listen address
pub const BIND_ENV: &str = "STOCK_BIND";

/// Environment variable holding the deployment environment name
pub const ENVIRONMENT_ENV: &str = "STOCK_ENV";

/// Application configuration shared by the workspace binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name, used in log lines
    pub app_name: String,
    /// Environment (development, production, etc.)
    pub environment: String,
    /// Socket address the HTTP server binds to
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "stock-snapshot".to_string(),
            environment: "development".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl AppConfig {
    /// Load overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(addr) = lookup(BIND_ENV).filter(|v| !v.trim().is_empty()) {
            config.bind_addr = addr.trim().to_string();
        }
        if let Some(env) = lookup(ENVIRONMENT_ENV).filter(|v| !v.trim().is_empty()) {
            config.environment = env.trim().to_string();
        }
        config
    }

    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
