//! Kubernetes capabilities.
//!
//! Plain reads are table driven: every [`ResourceKind`] yields a `get` and/or
//! `list` capability that returns the API object as JSON. Operations with
//! their own shape (logs, metrics, security contexts, mutations) are
//! implemented individually below.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use url::form_urlencoded::byte_serialize;

use helmsman_core::domain::capability::CapabilityGroup;

use super::{Capability, CapabilityArgs, CapabilityError, ParameterKind, ParameterSpec};
use crate::context::ExecutionContext;

pub const POD_LOG_TAIL_LINES: u32 = 100;
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";
const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceKind {
    pub get_name: Option<&'static str>,
    pub list_name: Option<&'static str>,
    pub label: &'static str,
    /// API group path, e.g. `/api/v1` or `/apis/apps/v1`.
    pub api_path: &'static str,
    pub resource: &'static str,
    /// Argument naming the object in `get` calls, e.g. `podName`.
    pub name_param: &'static str,
    pub namespaced: bool,
}

const fn kind(
    get_name: Option<&'static str>,
    list_name: Option<&'static str>,
    label: &'static str,
    api_path: &'static str,
    resource: &'static str,
    name_param: &'static str,
    namespaced: bool,
) -> ResourceKind {
    ResourceKind { get_name, list_name, label, api_path, resource, name_param, namespaced }
}

pub const RESOURCE_KINDS: &[ResourceKind] = &[
    kind(Some("getPod"), Some("listPods"), "pod", "/api/v1", "pods", "podName", true),
    kind(Some("getDeployment"), Some("listDeployments"), "deployment", "/apis/apps/v1", "deployments", "deploymentName", true),
    kind(Some("getStatefulSet"), Some("listStatefulSets"), "stateful set", "/apis/apps/v1", "statefulsets", "statefulSetName", true),
    kind(Some("getDaemonSet"), Some("listDaemonSets"), "daemon set", "/apis/apps/v1", "daemonsets", "daemonSetName", true),
    kind(Some("getJob"), Some("listJobs"), "job", "/apis/batch/v1", "jobs", "jobName", true),
    kind(Some("getCronJob"), Some("listCronJobs"), "cron job", "/apis/batch/v1", "cronjobs", "cronJobName", true),
    kind(Some("getConfigMap"), Some("listConfigMaps"), "config map", "/api/v1", "configmaps", "configMapName", true),
    kind(Some("getSecret"), Some("listSecrets"), "secret", "/api/v1", "secrets", "secretName", true),
    kind(Some("getService"), Some("listServices"), "service", "/api/v1", "services", "serviceName", true),
    kind(Some("getServiceAccount"), Some("listServiceAccounts"), "service account", "/api/v1", "serviceaccounts", "serviceAccountName", true),
    kind(Some("getIngress"), Some("listIngresses"), "ingress", "/apis/networking.k8s.io/v1", "ingresses", "ingressName", true),
    kind(None, Some("listNetworkPolicies"), "network policy", "/apis/networking.k8s.io/v1", "networkpolicies", "networkPolicyName", true),
    kind(Some("getEndpointSlice"), Some("listEndpointSlices"), "endpoint slice", "/apis/discovery.k8s.io/v1", "endpointslices", "endpointSliceName", true),
    kind(Some("getHpa"), Some("listHpas"), "horizontal pod autoscaler", "/apis/autoscaling/v2", "horizontalpodautoscalers", "hpaName", true),
    kind(Some("getPdb"), Some("listPdbs"), "pod disruption budget", "/apis/policy/v1", "poddisruptionbudgets", "pdbName", true),
    kind(Some("getLimitRange"), Some("listLimitRanges"), "limit range", "/api/v1", "limitranges", "limitRangeName", true),
    kind(Some("getPersistentVolumeClaim"), Some("listPersistentVolumeClaims"), "persistent volume claim", "/api/v1", "persistentvolumeclaims", "persistentVolumeClaimName", true),
    kind(Some("getPersistentVolume"), Some("listPersistentVolumes"), "persistent volume", "/api/v1", "persistentvolumes", "persistentVolumeName", false),
    kind(Some("getStorageClass"), Some("listStorageClasses"), "storage class", "/apis/storage.k8s.io/v1", "storageclasses", "storageClassName", false),
    kind(Some("getNode"), Some("listNodes"), "node", "/api/v1", "nodes", "nodeName", false),
    kind(None, Some("listNamespaces"), "namespace", "/api/v1", "namespaces", "namespace", false),
    kind(Some("getRole"), Some("listRoles"), "role", "/apis/rbac.authorization.k8s.io/v1", "roles", "roleName", true),
    kind(Some("getRoleBinding"), Some("listRoleBindings"), "role binding", "/apis/rbac.authorization.k8s.io/v1", "rolebindings", "roleBindingName", true),
    kind(Some("getClusterRole"), Some("listClusterRoles"), "cluster role", "/apis/rbac.authorization.k8s.io/v1", "clusterroles", "clusterRoleName", false),
    kind(Some("getCrd"), Some("listCrds"), "custom resource definition", "/apis/apiextensions.k8s.io/v1", "customresourcedefinitions", "crdName", false),
];

const NAMESPACE: ParameterSpec =
    ParameterSpec::required("namespaceName", ParameterKind::ResourceName, "Namespace of the object");
const NAMESPACE_FILTER: ParameterSpec = ParameterSpec::optional(
    "namespaceName",
    ParameterKind::ResourceName,
    "Namespace to list; all namespaces when omitted",
);
const POD_NAME: ParameterSpec =
    ParameterSpec::required("podName", ParameterKind::ResourceName, "Name of the pod");
const NAMESPACED_LIST: &[ParameterSpec] = &[NAMESPACE_FILTER];
const POD_TARGET: &[ParameterSpec] = &[POD_NAME, NAMESPACE];

/// Every Kubernetes capability, read and write.
pub fn catalogue() -> Vec<Arc<dyn Capability>> {
    let mut capabilities: Vec<Arc<dyn Capability>> = Vec::new();
    for kind in RESOURCE_KINDS {
        if let Some(name) = kind.get_name {
            capabilities.push(Arc::new(GetResource::new(*kind, name)));
        }
        if let Some(name) = kind.list_name {
            capabilities.push(Arc::new(ListResource::new(*kind, name)));
        }
    }
    capabilities.push(Arc::new(DescribeService));
    capabilities.push(Arc::new(PodLogs));
    capabilities.push(Arc::new(TopPods));
    capabilities.push(Arc::new(GetSecurityContext));
    capabilities.push(Arc::new(ListSecurityContexts));
    capabilities.push(Arc::new(DeletePod));
    capabilities.push(Arc::new(RolloutDeployment));
    capabilities
}

impl ResourceKind {
    pub fn object_path(&self, namespace: Option<&str>, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }

    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        match namespace.filter(|_| self.namespaced) {
            Some(namespace) => {
                format!("{}/namespaces/{}/{}", self.api_path, namespace, self.resource)
            }
            None => format!("{}/{}", self.api_path, self.resource),
        }
    }
}

fn to_text(value: &Value) -> String {
    value.to_string()
}

/// Replaces secret payload values; keys stay visible.
fn redact_secret(object: &mut Value) {
    for field in ["data", "stringData"] {
        if let Some(Value::Object(entries)) = object.get_mut(field) {
            for value in entries.values_mut() {
                *value = Value::String("<redacted>".to_string());
            }
        }
    }
}

fn redact_secret_list(list: &mut Value) {
    if let Some(Value::Array(items)) = list.get_mut("items") {
        items.iter_mut().for_each(redact_secret);
    }
}

pub struct GetResource {
    kind: ResourceKind,
    name: &'static str,
    description: String,
    parameters: Vec<ParameterSpec>,
}

impl GetResource {
    pub fn new(kind: ResourceKind, name: &'static str) -> Self {
        let mut parameters = vec![ParameterSpec::required(
            kind.name_param,
            ParameterKind::ResourceName,
            "Name of the object",
        )];
        if kind.namespaced {
            parameters.push(NAMESPACE);
        }
        Self { kind, name, description: format!("Get the details of a {}", kind.label), parameters }
    }
}

#[async_trait]
impl Capability for GetResource {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let name = args.resource_name(self.kind.name_param)?;
        let namespace =
            if self.kind.namespaced { Some(args.resource_name("namespaceName")?) } else { None };

        let mut object = ctx.cluster().get_json(&self.kind.object_path(namespace, name)).await?;
        if self.kind.resource == "secrets" {
            redact_secret(&mut object);
        }
        Ok(to_text(&object))
    }
}

pub struct ListResource {
    kind: ResourceKind,
    name: &'static str,
    description: String,
}

impl ListResource {
    pub fn new(kind: ResourceKind, name: &'static str) -> Self {
        let scope = if kind.namespaced { " in a namespace" } else { " in the cluster" };
        Self { kind, name, description: format!("List all {} objects{scope}", kind.label) }
    }
}

#[async_trait]
impl Capability for ListResource {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        if self.kind.namespaced {
            NAMESPACED_LIST
        } else {
            &[]
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let namespace = args.optional_resource_name("namespaceName")?;
        let mut list = ctx.cluster().get_json(&self.kind.collection_path(namespace)).await?;
        if self.kind.resource == "secrets" {
            redact_secret_list(&mut list);
        }
        Ok(to_text(&list))
    }
}

pub struct DescribeService;

#[async_trait]
impl Capability for DescribeService {
    fn name(&self) -> &str {
        "describeService"
    }

    fn description(&self) -> &str {
        "Describe a service together with the endpoint slices backing it"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] = &[
            ParameterSpec::required("serviceName", ParameterKind::ResourceName, "Name of the service"),
            NAMESPACE,
        ];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let service = args.resource_name("serviceName")?;
        let namespace = args.resource_name("namespaceName")?;

        let object = ctx
            .cluster()
            .get_json(&format!("/api/v1/namespaces/{namespace}/services/{service}"))
            .await?;
        let endpoints = ctx.cluster().get_json(&endpoint_slices_path(namespace, service)).await?;

        Ok(to_text(&json!({ "service": object, "endpointSlices": endpoints })))
    }
}

fn endpoint_slices_path(namespace: &str, service: &str) -> String {
    let selector: String =
        byte_serialize(format!("{SERVICE_NAME_LABEL}={service}").as_bytes()).collect();
    format!("/apis/discovery.k8s.io/v1/namespaces/{namespace}/endpointslices?labelSelector={selector}")
}

pub struct PodLogs;

#[async_trait]
impl Capability for PodLogs {
    fn name(&self) -> &str {
        "podLogs"
    }

    fn description(&self) -> &str {
        "Get the last 100 log lines of a pod"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        POD_TARGET
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let pod = args.resource_name("podName")?;
        let namespace = args.resource_name("namespaceName")?;
        let path =
            format!("/api/v1/namespaces/{namespace}/pods/{pod}/log?tailLines={POD_LOG_TAIL_LINES}");
        Ok(ctx.cluster().get_text(&path).await?)
    }
}

pub struct TopPods;

#[async_trait]
impl Capability for TopPods {
    fn name(&self) -> &str {
        "topPods"
    }

    fn description(&self) -> &str {
        "Retrieve CPU and memory usage of all pods in a namespace"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] = &[NAMESPACE];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let namespace = args.resource_name("namespaceName")?;
        let metrics = ctx
            .cluster()
            .get_json(&format!("/apis/metrics.k8s.io/v1beta1/namespaces/{namespace}/pods"))
            .await?;
        Ok(to_text(&metrics))
    }
}

pub struct GetSecurityContext;

#[async_trait]
impl Capability for GetSecurityContext {
    fn name(&self) -> &str {
        "getSecurityContext"
    }

    fn description(&self) -> &str {
        "Retrieve the security context of a pod"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        POD_TARGET
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let pod = args.resource_name("podName")?;
        let namespace = args.resource_name("namespaceName")?;
        let object =
            ctx.cluster().get_json(&format!("/api/v1/namespaces/{namespace}/pods/{pod}")).await?;
        Ok(to_text(object.pointer("/spec/securityContext").unwrap_or(&Value::Null)))
    }
}

pub struct ListSecurityContexts;

#[async_trait]
impl Capability for ListSecurityContexts {
    fn name(&self) -> &str {
        "listSecurityContexts"
    }

    fn description(&self) -> &str {
        "List the security contexts of every pod in a namespace"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraRead
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] = &[NAMESPACE];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let namespace = args.resource_name("namespaceName")?;
        let pods = ctx.cluster().get_json(&format!("/api/v1/namespaces/{namespace}/pods")).await?;

        let contexts: Vec<Value> = pods
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|pod| {
                        json!({
                            "pod": pod.pointer("/metadata/name").cloned().unwrap_or(Value::Null),
                            "securityContext": pod
                                .pointer("/spec/securityContext")
                                .cloned()
                                .unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(to_text(&Value::Array(contexts)))
    }
}

pub struct DeletePod;

#[async_trait]
impl Capability for DeletePod {
    fn name(&self) -> &str {
        "deletePod"
    }

    fn description(&self) -> &str {
        "Delete a pod"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraWrite
    }

    fn parameters(&self) -> &[ParameterSpec] {
        POD_TARGET
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let pod = args.resource_name("podName")?;
        let namespace = args.resource_name("namespaceName")?;
        ctx.cluster().delete(&format!("/api/v1/namespaces/{namespace}/pods/{pod}")).await?;
        Ok(format!("Pod {pod} deleted"))
    }
}

pub struct RolloutDeployment;

#[async_trait]
impl Capability for RolloutDeployment {
    fn name(&self) -> &str {
        "rolloutDeployment"
    }

    fn description(&self) -> &str {
        "Perform a rollout restart for a deployment"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::InfraWrite
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] = &[
            ParameterSpec::required(
                "deploymentName",
                ParameterKind::ResourceName,
                "Name of the deployment",
            ),
            NAMESPACE,
        ];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let deployment = args.resource_name("deploymentName")?;
        let namespace = args.resource_name("namespaceName")?;
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": { RESTARTED_AT_ANNOTATION: Utc::now().to_rfc3339() }
                    }
                }
            }
        });

        ctx.cluster()
            .merge_patch(
                &format!("/apis/apps/v1/namespaces/{namespace}/deployments/{deployment}"),
                &patch,
            )
            .await?;
        Ok(format!("Rollout restart successfully triggered for deployment {deployment}"))
    }
}
