use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

pub fn planexec_root() -> PathBuf {
    match env::var("PLANEXEC_ROOT") {
        Ok(s) if !s.is_empty() => PathBuf::from(s),
        _ => PathBuf::from("/etc/planexec"),
    }
}

/// Directory holding one sub-directory per operator version.
pub fn operators_dir() -> PathBuf {
    planexec_root().join("operators")
}

pub fn state_file_path() -> PathBuf {
    let mut root = planexec_root();
    root.push("state");
    std::fs::create_dir_all(&root).ok();
    root.push("state.json");
    root
}

/// Redis namespace for a route prefix: `global`, or the prefix's SHA-256 in hex.
pub fn tenant_key(prefix: &str) -> String {
    if prefix.is_empty() {
        "global".to_string()
    } else {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub fn prefixed(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub root: PathBuf,
    pub prefix: String,
    pub cluster_api_url: Option<String>,
    pub cluster_token: Option<String>,
    pub redis_url: Option<String>,
    pub nats_url: Option<String>,
    pub reconcile_interval: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root: PathBuf::from("/etc/planexec"),
            prefix: String::new(),
            cluster_api_url: None,
            cluster_token: None,
            redis_url: None,
            nats_url: None,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let prefix = env::var("PLANEXEC_PREFIX").unwrap_or_default();
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            root: planexec_root(),
            prefix: prefix.trim_end_matches('/').to_string(),
            cluster_api_url: non_empty("CLUSTER_API_URL"),
            cluster_token: non_empty("CLUSTER_TOKEN"),
            redis_url: non_empty("REDIS_URL"),
            nats_url: non_empty("NATS_URL"),
            reconcile_interval: env::var("RECONCILE_INTERVAL")
                .ok()
                .and_then(|s| humantime::parse_duration(&s).ok())
                .unwrap_or(DEFAULT_RECONCILE_INTERVAL),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn tenant_key(&self) -> String {
        tenant_key(&self.prefix)
    }

    /// `path` under the configured route prefix.
    pub fn route(&self, path: &str) -> String {
        prefixed(&self.prefix, path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for name in [
            "PORT",
            "PLANEXEC_ROOT",
            "PLANEXEC_PREFIX",
            "CLUSTER_API_URL",
            "CLUSTER_TOKEN",
            "REDIS_URL",
            "NATS_URL",
            "RECONCILE_INTERVAL",
            "LOG_LEVEL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_planexec_root_default() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("PLANEXEC_ROOT", "");
        assert_eq!(planexec_root(), PathBuf::from("/etc/planexec"));
    }

    #[test]
    fn test_paths_follow_root() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = tempfile::TempDir::new().unwrap();
        env::set_var("PLANEXEC_ROOT", tmp.path());

        assert_eq!(operators_dir(), tmp.path().join("operators"));
        let path = state_file_path();
        assert!(path.starts_with(tmp.path()));
        assert!(path.to_string_lossy().ends_with("state/state.json"));
        assert!(tmp.path().join("state").is_dir());
        env::remove_var("PLANEXEC_ROOT");
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let config = Config::from_env();
        assert_eq!(config, Config::default());
        assert_eq!(config.tenant_key(), "global");
        assert_eq!(config.route("/health"), "/health");
    }

    #[test]
    fn test_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("PORT", "8080");
        env::set_var("PLANEXEC_PREFIX", "/team-a/");
        env::set_var("RECONCILE_INTERVAL", "1m 30s");
        env::set_var("CLUSTER_API_URL", "https://cluster.local:6443");
        env::set_var("REDIS_URL", "");

        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.prefix, "/team-a");
        assert_eq!(config.reconcile_interval, Duration::from_secs(90));
        assert_eq!(config.cluster_api_url.as_deref(), Some("https://cluster.local:6443"));
        assert!(config.redis_url.is_none());
        assert_eq!(config.route("/instances"), "/team-a/instances");
        assert_eq!(config.tenant_key().len(), 64);
        assert_ne!(config.tenant_key(), tenant_key("/team-b"));
        clear_env();
    }

    #[test]
    fn test_bad_interval_falls_back() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("RECONCILE_INTERVAL", "soon");
        assert_eq!(Config::from_env().reconcile_interval, DEFAULT_RECONCILE_INTERVAL);
        clear_env();
    }
}
