use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Pods,
    Deployments,
    StatefulSets,
    DaemonSets,
    ReplicaSets,
    Jobs,
    CronJobs,
    Services,
    ConfigMaps,
    Secrets,
}

impl ResourceKind {
    pub const ALL: [Self; 10] = [
        Self::Pods,
        Self::Deployments,
        Self::StatefulSets,
        Self::DaemonSets,
        Self::ReplicaSets,
        Self::Jobs,
        Self::CronJobs,
        Self::Services,
        Self::ConfigMaps,
        Self::Secrets,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Pods => "Pods",
            Self::Deployments => "Deployments",
            Self::StatefulSets => "StatefulSets",
            Self::DaemonSets => "DaemonSets",
            Self::ReplicaSets => "ReplicaSets",
            Self::Jobs => "Jobs",
            Self::CronJobs => "CronJobs",
            Self::Services => "Services",
            Self::ConfigMaps => "ConfigMaps",
            Self::Secrets => "Secrets",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pods),
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "sts" | "statefulset" | "statefulsets" => Some(Self::StatefulSets),
            "ds" | "daemonset" | "daemonsets" | "daemon-set" | "daemon-sets" => {
                Some(Self::DaemonSets)
            }
            "rs" | "replicaset" | "replicasets" | "replica-set" | "replica-sets" => {
                Some(Self::ReplicaSets)
            }
            "job" | "jobs" => Some(Self::Jobs),
            "cj" | "cronjob" | "cronjobs" | "cron-job" | "cron-jobs" => Some(Self::CronJobs),
            "svc" | "service" | "services" => Some(Self::Services),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "secret" | "secrets" => Some(Self::Secrets),
            _ => None,
        }
    }

    pub fn short_token(self) -> &'static str {
        match self {
            Self::Pods => "po",
            Self::Deployments => "deploy",
            Self::StatefulSets => "sts",
            Self::DaemonSets => "ds",
            Self::ReplicaSets => "rs",
            Self::Jobs => "job",
            Self::CronJobs => "cj",
            Self::Services => "svc",
            Self::ConfigMaps => "cm",
            Self::Secrets => "secret",
        }
    }

    pub fn kubectl_resource(self) -> &'static str {
        match self {
            Self::Pods => "pod",
            Self::Deployments => "deployment",
            Self::StatefulSets => "statefulset",
            Self::DaemonSets => "daemonset",
            Self::ReplicaSets => "replicaset",
            Self::Jobs => "job",
            Self::CronJobs => "cronjob",
            Self::Services => "service",
            Self::ConfigMaps => "configmap",
            Self::Secrets => "secret",
        }
    }

    pub fn has_data(self) -> bool {
        matches!(self, Self::ConfigMaps | Self::Secrets)
    }

    pub fn is_scalable(self) -> bool {
        matches!(self, Self::Deployments | Self::StatefulSets)
    }

    pub fn has_related_pods(self) -> bool {
        matches!(
            self,
            Self::Deployments
                | Self::StatefulSets
                | Self::DaemonSets
                | Self::ReplicaSets
                | Self::Jobs
                | Self::Services
        )
    }

    pub fn supports_port_forward(self) -> bool {
        matches!(self, Self::Pods | Self::Services)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    pub fn from_param(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == "all" || value == "*" {
            Self::All
        } else {
            Self::Named(value.to_string())
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Named(namespace) => namespace.clone(),
        }
    }

    pub fn named(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(namespace) => Some(namespace),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ResourceRow {
    pub name: String,
    pub namespace: Option<String>,
    pub columns: Vec<String>,
}

impl ResourceRow {
    pub fn matches_filter(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }

        let query_lower = query.to_ascii_lowercase();

        if self.name.to_ascii_lowercase().contains(&query_lower) {
            return true;
        }

        if let Some(namespace) = &self.namespace
            && namespace.to_ascii_lowercase().contains(&query_lower)
        {
            return true;
        }

        self.columns
            .iter()
            .any(|column| column.to_ascii_lowercase().contains(&query_lower))
    }

    pub fn same_identity(&self, other: &ResourceRow) -> bool {
        self.name == other.name && self.namespace == other.namespace
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ResourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<ResourceRow>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ResourceDocument {
    pub kind: Option<ResourceKind>,
    pub namespace: Option<String>,
    pub name: String,
    pub yaml: String,
    pub containers: Vec<String>,
    pub selector: Option<String>,
    pub data_keys: Vec<String>,
    pub replicas: Option<i32>,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceChange {
    SetData { key: String, value: String },
    RemoveData { key: String },
    Scale { replicas: i32 },
    Restart,
}

impl ResourceChange {
    pub fn describe(&self) -> String {
        match self {
            Self::SetData { key, .. } => format!("set key '{key}'"),
            Self::RemoveData { key } => format!("removed key '{key}'"),
            Self::Scale { replicas } => format!("scaled to {replicas} replicas"),
            Self::Restart => "restart triggered".to_string(),
        }
    }
}
