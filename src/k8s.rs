use anyhow::{Context, Result};
use chrono::Utc;
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, PodTemplateSpec, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use tracing::{debug, info};

use crate::effect::qualified;
use crate::logs::{LogLines, LogRequest};
use crate::model::{
    NamespaceScope, ResourceChange, ResourceDocument, ResourceKind, ResourceRow, ResourceTable,
};

const LIST_LIMIT: u32 = 500;
const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

pub trait ClusterClient: Send + Sync + 'static {
    fn list(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
        selector: Option<&str>,
    ) -> impl Future<Output = Result<ResourceTable>> + Send;

    fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> impl Future<Output = Result<ResourceDocument>> + Send;

    fn delete(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        grace_period_secs: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        change: &ResourceChange,
    ) -> impl Future<Output = Result<()>> + Send;

    fn namespaces(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn open_logs(&self, request: &LogRequest) -> impl Future<Output = Result<LogLines>> + Send;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NotFound {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl NotFound {
    pub fn new(kind: ResourceKind, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }
}

impl Display for NotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} no longer exists",
            self.kind.kubectl_resource(),
            qualified(self.namespace.as_deref(), &self.name)
        )
    }
}

impl std::error::Error for NotFound {}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ClusterIdentity {
    pub context: String,
    pub cluster: String,
    pub user: String,
    pub default_namespace: String,
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    identity: ClusterIdentity,
}

trait NamespacedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

impl KubeGateway {
    pub async fn connect() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let context = kubeconfig
            .as_ref()
            .and_then(|cfg| cfg.current_context.clone())
            .unwrap_or_else(|| "in-cluster".to_string());
        let user = kubeconfig
            .as_ref()
            .and_then(|cfg| cfg.contexts.iter().find(|named| named.name == context))
            .and_then(|named| named.context.as_ref())
            .and_then(|entry| entry.user.clone())
            .unwrap_or_else(|| "-".to_string());

        Ok(Self {
            client,
            identity: ClusterIdentity {
                context,
                cluster,
                user,
                default_namespace,
            },
        })
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub async fn check_reachable(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .with_context(|| format!("cannot reach API server at {}", self.identity.cluster))?;
        info!(
            "connected to {} ({}) as {}",
            self.identity.cluster, info.git_version, self.identity.user
        );
        Ok(info.git_version)
    }

    fn scoped<K: NamespacedObject>(&self, scope: &NamespaceScope) -> Api<K> {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(namespace) => Api::namespaced(self.client.clone(), namespace),
        }
    }

    async fn list_rows<K: NamespacedObject>(
        &self,
        scope: &NamespaceScope,
        selector: Option<&str>,
        columns: fn(&K) -> Vec<String>,
    ) -> Result<Vec<ResourceRow>> {
        let api = self.scoped::<K>(scope);
        let list = api.list(&list_params(selector)).await?;
        Ok(list
            .into_iter()
            .map(|object| ResourceRow {
                name: object.name_any(),
                namespace: object.namespace(),
                columns: columns(&object),
            })
            .collect())
    }

    async fn fetch<K: NamespacedObject>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let object = api.get_opt(name).await.with_context(|| {
            format!(
                "failed to fetch {} {namespace}/{name}",
                kind.kubectl_resource()
            )
        })?;
        let object =
            object.ok_or_else(|| NotFound::new(kind, Some(namespace.to_string()), name))?;
        Ok(object)
    }

    async fn fetch_value<K: NamespacedObject>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value> {
        let object = self.fetch::<K>(kind, namespace, name).await?;
        serde_json::to_value(&object).context("failed to serialize resource")
    }

    async fn remove<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        params: &DeleteParams,
    ) -> Result<()> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let _ = api.delete(name, params).await?;
        Ok(())
    }

    // resource version is cleared so the replace is unconditional
    async fn modify<K, F>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        apply: F,
    ) -> Result<()>
    where
        K: NamespacedObject,
        F: FnOnce(&mut K) -> Result<()> + Send,
    {
        let mut object = self.fetch::<K>(kind, namespace, name).await?;
        apply(&mut object)?;
        object.meta_mut().resource_version = None;
        object.meta_mut().managed_fields = None;

        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let _ = api
            .replace(name, &PostParams::default(), &object)
            .await
            .with_context(|| {
                format!(
                    "failed to update {} {namespace}/{name}",
                    kind.kubectl_resource()
                )
            })?;
        Ok(())
    }
}

impl ClusterClient for KubeGateway {
    async fn list(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
        selector: Option<&str>,
    ) -> Result<ResourceTable> {
        let mut rows = match kind {
            ResourceKind::Pods => self.list_rows::<Pod>(scope, selector, pod_columns).await?,
            ResourceKind::Deployments => {
                self.list_rows::<Deployment>(scope, selector, deployment_columns)
                    .await?
            }
            ResourceKind::StatefulSets => {
                self.list_rows::<StatefulSet>(scope, selector, statefulset_columns)
                    .await?
            }
            ResourceKind::DaemonSets => {
                self.list_rows::<DaemonSet>(scope, selector, daemonset_columns)
                    .await?
            }
            ResourceKind::ReplicaSets => {
                self.list_rows::<ReplicaSet>(scope, selector, replicaset_columns)
                    .await?
            }
            ResourceKind::Jobs => self.list_rows::<Job>(scope, selector, job_columns).await?,
            ResourceKind::CronJobs => {
                self.list_rows::<CronJob>(scope, selector, cronjob_columns)
                    .await?
            }
            ResourceKind::Services => {
                self.list_rows::<Service>(scope, selector, service_columns)
                    .await?
            }
            ResourceKind::ConfigMaps => {
                self.list_rows::<ConfigMap>(scope, selector, configmap_columns)
                    .await?
            }
            ResourceKind::Secrets => {
                self.list_rows::<Secret>(scope, selector, secret_columns)
                    .await?
            }
        };

        rows.sort_by(|left, right| {
            left.namespace
                .cmp(&right.namespace)
                .then_with(|| left.name.cmp(&right.name))
        });
        debug!("listed {} {kind} in {scope}", rows.len());

        Ok(ResourceTable {
            headers: headers(kind),
            rows,
        })
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<ResourceDocument> {
        let namespace = namespace.with_context(|| {
            format!("namespace is required to fetch {}", kind.kubectl_resource())
        })?;
        let value = match kind {
            ResourceKind::Pods => self.fetch_value::<Pod>(kind, namespace, name).await?,
            ResourceKind::Deployments => {
                self.fetch_value::<Deployment>(kind, namespace, name)
                    .await?
            }
            ResourceKind::StatefulSets => {
                self.fetch_value::<StatefulSet>(kind, namespace, name)
                    .await?
            }
            ResourceKind::DaemonSets => {
                self.fetch_value::<DaemonSet>(kind, namespace, name)
                    .await?
            }
            ResourceKind::ReplicaSets => {
                self.fetch_value::<ReplicaSet>(kind, namespace, name)
                    .await?
            }
            ResourceKind::Jobs => self.fetch_value::<Job>(kind, namespace, name).await?,
            ResourceKind::CronJobs => self.fetch_value::<CronJob>(kind, namespace, name).await?,
            ResourceKind::Services => self.fetch_value::<Service>(kind, namespace, name).await?,
            ResourceKind::ConfigMaps => {
                self.fetch_value::<ConfigMap>(kind, namespace, name)
                    .await?
            }
            ResourceKind::Secrets => self.fetch_value::<Secret>(kind, namespace, name).await?,
        };

        Ok(build_document(kind, value))
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        grace_period_secs: u32,
    ) -> Result<()> {
        let namespace = namespace.with_context(|| {
            format!(
                "namespace is required for {} delete",
                kind.kubectl_resource()
            )
        })?;
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_secs),
            ..DeleteParams::default()
        };
        match kind {
            ResourceKind::Pods => self.remove::<Pod>(namespace, name, &params).await?,
            ResourceKind::Deployments => {
                self.remove::<Deployment>(namespace, name, &params).await?
            }
            ResourceKind::StatefulSets => {
                self.remove::<StatefulSet>(namespace, name, &params).await?
            }
            ResourceKind::DaemonSets => self.remove::<DaemonSet>(namespace, name, &params).await?,
            ResourceKind::ReplicaSets => {
                self.remove::<ReplicaSet>(namespace, name, &params).await?
            }
            ResourceKind::Jobs => self.remove::<Job>(namespace, name, &params).await?,
            ResourceKind::CronJobs => self.remove::<CronJob>(namespace, name, &params).await?,
            ResourceKind::Services => self.remove::<Service>(namespace, name, &params).await?,
            ResourceKind::ConfigMaps => self.remove::<ConfigMap>(namespace, name, &params).await?,
            ResourceKind::Secrets => self.remove::<Secret>(namespace, name, &params).await?,
        }
        info!(
            "deleted {} {namespace}/{name} (grace {grace_period_secs}s)",
            kind.kubectl_resource()
        );
        Ok(())
    }

    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        change: &ResourceChange,
    ) -> Result<()> {
        match kind {
            ResourceKind::ConfigMaps => {
                self.modify::<ConfigMap, _>(kind, namespace, name, |configmap| {
                    change_configmap(configmap, change)
                })
                .await?
            }
            ResourceKind::Secrets => {
                self.modify::<Secret, _>(kind, namespace, name, |secret| {
                    change_secret(secret, change)
                })
                .await?
            }
            ResourceKind::Deployments => {
                self.modify::<Deployment, _>(kind, namespace, name, |deployment| {
                    let spec = deployment.spec.get_or_insert_with(Default::default);
                    change_workload(&mut spec.replicas, &mut spec.template, change)
                })
                .await?
            }
            ResourceKind::StatefulSets => {
                self.modify::<StatefulSet, _>(kind, namespace, name, |statefulset| {
                    let spec = statefulset.spec.get_or_insert_with(Default::default);
                    change_workload(&mut spec.replicas, &mut spec.template, change)
                })
                .await?
            }
            _ => anyhow::bail!("{} is not supported for {}", change.describe(), kind.title()),
        }
        info!(
            "updated {} {namespace}/{name}: {}",
            kind.kubectl_resource(),
            change.describe()
        );
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&list_params(None))
            .await
            .context("failed to list namespaces")?;
        let mut names = list
            .into_iter()
            .map(|namespace| namespace.name_any())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    async fn open_logs(&self, request: &LogRequest) -> Result<LogLines> {
        let _ = self
            .fetch::<Pod>(ResourceKind::Pods, &request.namespace, &request.pod)
            .await?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &request.namespace);
        let params = LogParams {
            container: request.container.clone(),
            follow: request.follow,
            tail_lines: request.tail_lines,
            ..LogParams::default()
        };
        let reader = pods
            .log_stream(&request.pod, &params)
            .await
            .with_context(|| format!("failed to open logs for {}", request.target_label()))?;

        Ok(reader.lines().boxed())
    }
}

fn list_params(selector: Option<&str>) -> ListParams {
    let params = ListParams::default().limit(LIST_LIMIT);
    match selector.map(str::trim).filter(|value| !value.is_empty()) {
        Some(selector) => params.labels(selector),
        None => params,
    }
}

fn headers(kind: ResourceKind) -> Vec<String> {
    let specific: &[&str] = match kind {
        ResourceKind::Pods => &["Node", "Ready", "Status", "Restarts"],
        ResourceKind::Deployments => &["Ready", "Updated", "Available"],
        ResourceKind::StatefulSets => &["Ready", "Current"],
        ResourceKind::DaemonSets => &["Ready", "Updated", "Available"],
        ResourceKind::ReplicaSets => &["Ready", "Desired"],
        ResourceKind::Jobs => &["Completions", "Active", "Failed"],
        ResourceKind::CronJobs => &["Schedule", "Suspend", "Active", "Last"],
        ResourceKind::Services => &["Type", "Cluster IP", "Ports"],
        ResourceKind::ConfigMaps => &["Data", "Binary"],
        ResourceKind::Secrets => &["Type", "Data"],
    };

    ["Name", "Namespace"]
        .iter()
        .chain(specific)
        .chain(["Age"].iter())
        .map(|header| header.to_string())
        .collect()
}

fn row<K: Resource>(object: &K, specific: Vec<String>) -> Vec<String> {
    let mut columns = vec![
        object.meta().name.clone().unwrap_or_default(),
        object
            .meta()
            .namespace
            .clone()
            .unwrap_or_else(|| "-".to_string()),
    ];
    columns.extend(specific);
    columns.push(human_age(object.meta().creation_timestamp.as_ref()));
    columns
}

fn pod_columns(pod: &Pod) -> Vec<String> {
    let status = pod
        .status
        .as_ref()
        .and_then(|value| value.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let node = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.clone())
        .unwrap_or_else(|| "-".to_string());
    let (ready, total, restarts) = pod.status.as_ref().map(pod_readiness).unwrap_or((0, 0, 0));

    row(
        pod,
        vec![node, format!("{ready}/{total}"), status, restarts.to_string()],
    )
}

fn deployment_columns(deployment: &Deployment) -> Vec<String> {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
    let updated = status
        .and_then(|status| status.updated_replicas)
        .unwrap_or(0);
    let available = status
        .and_then(|status| status.available_replicas)
        .unwrap_or(0);

    row(
        deployment,
        vec![
            format!("{ready}/{desired}"),
            updated.to_string(),
            available.to_string(),
        ],
    )
}

fn statefulset_columns(statefulset: &StatefulSet) -> Vec<String> {
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = statefulset.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
    let current = status
        .and_then(|status| status.current_replicas)
        .unwrap_or(0);

    row(
        statefulset,
        vec![format!("{ready}/{desired}"), current.to_string()],
    )
}

fn daemonset_columns(daemonset: &DaemonSet) -> Vec<String> {
    let status = daemonset.status.as_ref();
    let desired = status
        .map(|status| status.desired_number_scheduled)
        .unwrap_or(0);
    let ready = status.map(|status| status.number_ready).unwrap_or(0);
    let updated = status
        .and_then(|status| status.updated_number_scheduled)
        .unwrap_or(0);
    let available = status
        .and_then(|status| status.number_available)
        .unwrap_or(0);

    row(
        daemonset,
        vec![
            format!("{ready}/{desired}"),
            updated.to_string(),
            available.to_string(),
        ],
    )
}

fn replicaset_columns(replicaset: &ReplicaSet) -> Vec<String> {
    let desired = replicaset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = replicaset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);

    row(
        replicaset,
        vec![format!("{ready}/{desired}"), desired.to_string()],
    )
}

fn job_columns(job: &Job) -> Vec<String> {
    let desired = job
        .spec
        .as_ref()
        .and_then(|spec| spec.completions)
        .unwrap_or(1);
    let status = job.status.as_ref();
    let succeeded = status.and_then(|status| status.succeeded).unwrap_or(0);
    let active = status.and_then(|status| status.active).unwrap_or(0);
    let failed = status.and_then(|status| status.failed).unwrap_or(0);

    row(
        job,
        vec![
            format!("{succeeded}/{desired}"),
            active.to_string(),
            failed.to_string(),
        ],
    )
}

fn cronjob_columns(cronjob: &CronJob) -> Vec<String> {
    let schedule = cronjob
        .spec
        .as_ref()
        .map(|spec| spec.schedule.clone())
        .unwrap_or_else(|| "-".to_string());
    let suspended = cronjob
        .spec
        .as_ref()
        .and_then(|spec| spec.suspend)
        .unwrap_or(false);
    let active = cronjob
        .status
        .as_ref()
        .and_then(|status| status.active.as_ref())
        .map(|entries| entries.len())
        .unwrap_or(0);
    let last = cronjob
        .status
        .as_ref()
        .and_then(|status| status.last_schedule_time.as_ref())
        .map_or_else(|| "-".to_string(), |time| human_age(Some(time)));

    row(
        cronjob,
        vec![
            truncate(&schedule, 28),
            if suspended { "Yes" } else { "No" }.to_string(),
            active.to_string(),
            last,
        ],
    )
}

fn service_columns(service: &Service) -> Vec<String> {
    let service_type = service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.clone())
        .unwrap_or_else(|| "ClusterIP".to_string());
    let cluster_ip = service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.clone())
        .unwrap_or_else(|| "-".to_string());

    row(
        service,
        vec![service_type, cluster_ip, service_ports_summary(service)],
    )
}

fn configmap_columns(configmap: &ConfigMap) -> Vec<String> {
    let data = configmap.data.as_ref().map(|map| map.len()).unwrap_or(0);
    let binary = configmap
        .binary_data
        .as_ref()
        .map(|map| map.len())
        .unwrap_or(0);

    row(configmap, vec![data.to_string(), binary.to_string()])
}

fn secret_columns(secret: &Secret) -> Vec<String> {
    let kind = secret.type_.clone().unwrap_or_else(|| "Opaque".to_string());
    let data = secret.data.as_ref().map(|map| map.len()).unwrap_or(0);

    row(secret, vec![truncate(&kind, 20), data.to_string()])
}

fn service_ports_summary(service: &Service) -> String {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.clone())
        .unwrap_or_default();
    if ports.is_empty() {
        return "-".to_string();
    }

    ports
        .into_iter()
        .map(|port| {
            let protocol = port.protocol.unwrap_or_else(|| "TCP".to_string());
            format!("{}/{}", port.port, protocol)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn pod_readiness(status: &k8s_openapi::api::core::v1::PodStatus) -> (usize, usize, i32) {
    let container_statuses = status.container_statuses.as_deref().unwrap_or(&[]);
    let total = container_statuses.len();
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

fn build_document(kind: ResourceKind, mut value: Value) -> ResourceDocument {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
    }

    let metadata = value.get("metadata");
    let name = metadata
        .and_then(|meta| meta.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let namespace = metadata
        .and_then(|meta| meta.get("namespace"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let containers_path = match kind {
        ResourceKind::Pods => Some("/spec/containers"),
        ResourceKind::CronJobs => Some("/spec/jobTemplate/spec/template/spec/containers"),
        ResourceKind::Services | ResourceKind::ConfigMaps | ResourceKind::Secrets => None,
        _ => Some("/spec/template/spec/containers"),
    };
    let containers = containers_path
        .and_then(|path| value.pointer(path))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let selector_path = match kind {
        ResourceKind::Services => Some("/spec/selector"),
        ResourceKind::Deployments
        | ResourceKind::StatefulSets
        | ResourceKind::DaemonSets
        | ResourceKind::ReplicaSets
        | ResourceKind::Jobs => Some("/spec/selector/matchLabels"),
        _ => None,
    };
    let selector = selector_path
        .and_then(|path| value.pointer(path))
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
                .collect::<BTreeMap<_, _>>()
        })
        .filter(|labels| !labels.is_empty())
        .map(|labels| selector_query(&labels));

    let mut data_keys = Vec::new();
    if kind.has_data() {
        for section in ["data", "binaryData"] {
            if let Some(entries) = value.get(section).and_then(Value::as_object) {
                data_keys.extend(entries.keys().cloned());
            }
        }
        data_keys.sort();
        data_keys.dedup();
    }

    let replicas = if kind.is_scalable() {
        value
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .and_then(|replicas| i32::try_from(replicas).ok())
    } else {
        None
    };

    let mut ports = match kind {
        ResourceKind::Pods => value
            .pointer("/spec/containers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|container| container.get("ports").and_then(Value::as_array))
            .flatten()
            .filter_map(|port| port.get("containerPort").and_then(Value::as_u64))
            .filter_map(|port| u16::try_from(port).ok())
            .collect::<Vec<_>>(),
        ResourceKind::Services => value
            .pointer("/spec/ports")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|port| port.get("port").and_then(Value::as_u64))
            .filter_map(|port| u16::try_from(port).ok())
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    ports.sort_unstable();
    ports.dedup();

    let yaml = yaml_detail(&value);

    ResourceDocument {
        kind: Some(kind),
        namespace,
        name,
        yaml,
        containers,
        selector,
        data_keys,
        replicas,
        ports,
    }
}

fn change_configmap(configmap: &mut ConfigMap, change: &ResourceChange) -> Result<()> {
    match change {
        ResourceChange::SetData { key, value } => {
            validate_data_key(key)?;
            if let Some(binary) = configmap.binary_data.as_mut() {
                binary.remove(key);
            }
            configmap
                .data
                .get_or_insert_with(BTreeMap::new)
                .insert(key.clone(), value.clone());
        }
        ResourceChange::RemoveData { key } => {
            let removed_text = configmap
                .data
                .as_mut()
                .and_then(|data| data.remove(key))
                .is_some();
            let removed_binary = configmap
                .binary_data
                .as_mut()
                .and_then(|data| data.remove(key))
                .is_some();
            if !removed_text && !removed_binary {
                anyhow::bail!("key '{key}' is not present");
            }
        }
        other => anyhow::bail!("{} is not supported for ConfigMaps", other.describe()),
    }
    Ok(())
}

fn change_secret(secret: &mut Secret, change: &ResourceChange) -> Result<()> {
    match change {
        ResourceChange::SetData { key, value } => {
            validate_data_key(key)?;
            if let Some(string_data) = secret.string_data.as_mut() {
                string_data.remove(key);
            }
            secret
                .data
                .get_or_insert_with(BTreeMap::new)
                .insert(key.clone(), ByteString(value.clone().into_bytes()));
        }
        ResourceChange::RemoveData { key } => {
            let removed = secret
                .data
                .as_mut()
                .and_then(|data| data.remove(key))
                .is_some();
            if !removed {
                anyhow::bail!("key '{key}' is not present");
            }
        }
        other => anyhow::bail!("{} is not supported for Secrets", other.describe()),
    }
    Ok(())
}

fn change_workload(
    replicas: &mut Option<i32>,
    template: &mut PodTemplateSpec,
    change: &ResourceChange,
) -> Result<()> {
    match change {
        ResourceChange::Scale { replicas: target } => {
            if *target < 0 {
                anyhow::bail!("replicas must be zero or more, got {target}");
            }
            *replicas = Some(*target);
        }
        ResourceChange::Restart => {
            template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(
                    RESTARTED_AT_ANNOTATION.to_string(),
                    Utc::now().to_rfc3339(),
                );
        }
        other => anyhow::bail!("{} is not supported for workloads", other.describe()),
    }
    Ok(())
}

fn validate_data_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 253
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !valid {
        anyhow::bail!("'{key}' is not a valid data key");
    }
    Ok(())
}

fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }

    let mut out = value
        .chars()
        .take(max.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let now = k8s_openapi::jiff::Timestamp::now().as_second();
    format_elapsed_seconds((now - timestamp.0.as_second()).max(0))
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

fn yaml_detail<T>(value: &T) -> String
where
    T: Serialize,
{
    serde_yaml::to_string(value).unwrap_or_else(|error| format!("failed to format detail: {error}"))
}
