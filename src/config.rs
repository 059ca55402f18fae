use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::k8s::ClusterIdentity;
use crate::logs::FollowPolicy;
use crate::model::NamespaceScope;

const DEFAULT_REFRESH_MS: u64 = 5_000;
const MIN_REFRESH_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const DEFAULT_LOG_TAIL_LINES: i64 = 500;
const DEFAULT_LOG_RETRY_MS: u64 = 1_000;
const DEFAULT_DELETE_GRACE_PERIOD_SECS: u32 = 30;
const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub identity: ClusterIdentity,
    pub scope: NamespaceScope,
    pub selector: Option<String>,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub log_tail_lines: i64,
    pub log_retry_delay: Duration,
    pub follow_policy: FollowPolicy,
    pub delete_grace_period_secs: u32,
    pub shell: String,
    pub source: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            identity: ClusterIdentity::default(),
            scope: NamespaceScope::Named("default".to_string()),
            selector: None,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
            log_retry_delay: Duration::from_millis(DEFAULT_LOG_RETRY_MS),
            follow_policy: FollowPolicy::default(),
            delete_grace_period_secs: DEFAULT_DELETE_GRACE_PERIOD_SECS,
            shell: DEFAULT_SHELL.to_string(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, alias = "refresh")]
    pub refresh_ms: Option<u64>,
    #[serde(default, alias = "timeout_secs", alias = "timeout")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, alias = "tail_lines")]
    pub log_tail_lines: Option<i64>,
    #[serde(default)]
    pub log_retry_ms: Option<u64>,
    #[serde(default, alias = "grace_period_secs")]
    pub delete_grace_period_secs: Option<u32>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(skip)]
    pub source: Option<String>,
}

impl FileConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("invalid config document")
    }
}

pub fn load_file_config() -> Result<FileConfig> {
    let Some(path) = discover_config_path() else {
        return Ok(FileConfig::default());
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut parsed = FileConfig::parse(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    parsed.source = Some(path.display().to_string());
    info!("loaded config from {}", path.display());
    Ok(parsed)
}

pub fn resolve(args: &CliArgs, file: FileConfig, identity: ClusterIdentity) -> ViewConfig {
    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }

    let scope = if args.all_namespaces {
        NamespaceScope::All
    } else {
        let namespace = non_blank(args.namespace.clone())
            .or_else(|| non_blank(file.namespace.clone()))
            .unwrap_or_else(|| identity.default_namespace.clone());
        NamespaceScope::from_param(&namespace)
    };

    let refresh_ms = args
        .refresh_ms
        .or(file.refresh_ms)
        .unwrap_or(DEFAULT_REFRESH_MS)
        .max(MIN_REFRESH_MS);
    let request_timeout_secs = args
        .request_timeout_secs
        .or(file.request_timeout_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
        .max(1);
    let log_tail_lines = args
        .tail_lines
        .or(file.log_tail_lines)
        .unwrap_or(DEFAULT_LOG_TAIL_LINES)
        .max(1);
    let log_retry_ms = file.log_retry_ms.unwrap_or(DEFAULT_LOG_RETRY_MS).max(100);

    ViewConfig {
        identity,
        scope,
        selector: non_blank(args.selector.clone()).or_else(|| non_blank(file.selector)),
        refresh_interval: Duration::from_millis(refresh_ms),
        request_timeout: Duration::from_secs(request_timeout_secs),
        log_tail_lines,
        log_retry_delay: Duration::from_millis(log_retry_ms),
        follow_policy: FollowPolicy::default(),
        delete_grace_period_secs: file
            .delete_grace_period_secs
            .unwrap_or(DEFAULT_DELETE_GRACE_PERIOD_SECS),
        shell: non_blank(file.shell).unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        source: file.source,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBENAV_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("kubenav.yaml"), PathBuf::from(".kubenav.yaml")];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(&home).join(".config/kubenav/config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{FileConfig, resolve};
    use crate::cli::CliArgs;
    use crate::k8s::ClusterIdentity;
    use crate::model::NamespaceScope;
    use std::time::Duration;

    fn identity() -> ClusterIdentity {
        ClusterIdentity {
            context: "kind-dev".to_string(),
            cluster: "https://127.0.0.1:6443/".to_string(),
            user: "admin".to_string(),
            default_namespace: "kube-public".to_string(),
        }
    }

    #[test]
    fn parses_yaml_with_aliases() {
        let parsed = FileConfig::parse(
            "namespace: payments\nrefresh: 2000\ntail_lines: 50\nshell: /bin/bash\n",
        )
        .expect("config parses");
        assert_eq!(parsed.namespace.as_deref(), Some("payments"));
        assert_eq!(parsed.refresh_ms, Some(2000));
        assert_eq!(parsed.log_tail_lines, Some(50));
        assert_eq!(parsed.shell.as_deref(), Some("/bin/bash"));
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(FileConfig::parse("  \n").ok(), Some(FileConfig::default()));
        assert!(FileConfig::parse("refresh_ms: [1, 2]").is_err());
    }

    #[test]
    fn cli_overrides_file_and_file_overrides_defaults() {
        let args = CliArgs {
            namespace: Some("cli-ns".to_string()),
            refresh_ms: Some(1_500),
            ..CliArgs::default()
        };
        let file = FileConfig {
            namespace: Some("file-ns".to_string()),
            refresh_ms: Some(9_000),
            request_timeout_secs: Some(7),
            ..FileConfig::default()
        };

        let config = resolve(&args, file, identity());
        assert_eq!(config.scope, NamespaceScope::Named("cli-ns".to_string()));
        assert_eq!(config.refresh_interval, Duration::from_millis(1_500));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.log_tail_lines, 500);
        assert_eq!(config.shell, "/bin/sh");
    }

    #[test]
    fn kubeconfig_namespace_fills_the_gap() {
        let config = resolve(&CliArgs::default(), FileConfig::default(), identity());
        assert_eq!(
            config.scope,
            NamespaceScope::Named("kube-public".to_string())
        );
    }

    #[test]
    fn all_namespaces_flag_wins_and_refresh_is_floored() {
        let args = CliArgs {
            all_namespaces: true,
            namespace: Some("ignored".to_string()),
            refresh_ms: Some(10),
            selector: Some("  ".to_string()),
            ..CliArgs::default()
        };
        let file = FileConfig {
            selector: Some("app=web".to_string()),
            ..FileConfig::default()
        };

        let config = resolve(&args, file, identity());
        assert_eq!(config.scope, NamespaceScope::All);
        assert_eq!(config.refresh_interval, Duration::from_millis(500));
        assert_eq!(config.selector.as_deref(), Some("app=web"));
    }
}
