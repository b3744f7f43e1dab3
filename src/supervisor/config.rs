use crate::client::ClientConfig;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMMAND: &str = "opencode";
pub const DEFAULT_PORT: u16 = 4096;
pub const LOOPBACK: &str = "127.0.0.1";

/// How to launch and watch the backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Executable name or path; launched as `<command> serve --port <port> --hostname 127.0.0.1`.
    pub command: String,
    pub port: u16,
    pub hostname: String,
    /// Project root the backend runs in. `None` keeps the current directory.
    pub working_dir: Option<PathBuf>,
    /// Upper bound on the health wait after spawning.
    pub startup_timeout: Duration,
    pub health_poll_interval: Duration,
    /// Time between the graceful termination signal and the forced kill.
    pub stop_grace: Duration,
    pub extra_env: HashMap<String, String>,
    /// Settings of the REST client bound to the process. Its `base_url` is replaced.
    pub client: ClientConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            port: DEFAULT_PORT,
            hostname: LOOPBACK.to_string(),
            working_dir: None,
            startup_timeout: Duration::from_secs(15),
            health_poll_interval: Duration::from_millis(250),
            stop_grace: Duration::from_secs(3),
            extra_env: HashMap::new(),
            client: ClientConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Defaults with `OPENCODE_COMMAND`, `OPENCODE_PORT` and the client overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            client: ClientConfig::from_env(),
            ..Self::default()
        };
        if let Ok(command) = env::var("OPENCODE_COMMAND") {
            if !command.trim().is_empty() {
                cfg.command = command.trim().to_string();
            }
        }
        if let Some(port) = env::var("OPENCODE_PORT")
            .ok()
            .and_then(|s| s.trim().parse::<u16>().ok())
        {
            cfg.port = port;
        }
        cfg
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.health_poll_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }

    /// Arguments after the command.
    pub fn serve_args(&self) -> Vec<String> {
        vec![
            "serve".to_string(),
            "--port".to_string(),
            self.port.to_string(),
            "--hostname".to_string(),
            self.hostname.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_backend_cli() {
        let cfg = BackendConfig::default();
        assert_eq!(cfg.command, "opencode");
        assert_eq!(cfg.base_url(), "http://127.0.0.1:4096");
        assert_eq!(
            cfg.serve_args(),
            vec!["serve", "--port", "4096", "--hostname", "127.0.0.1"]
        );
    }

    #[test]
    fn builders_override() {
        let cfg = BackendConfig::default()
            .with_port(5000)
            .with_command("/opt/opencode")
            .with_env("A", "1");
        assert_eq!(cfg.base_url(), "http://127.0.0.1:5000");
        assert_eq!(cfg.command, "/opt/opencode");
        assert_eq!(cfg.extra_env.get("A").map(String::as_str), Some("1"));
    }
}
