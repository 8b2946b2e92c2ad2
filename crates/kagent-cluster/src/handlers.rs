//! One [`ToolHandler`] per inspection tool.
//!
//! Handlers parse validated arguments, run the query, and normalize the
//! result. Kube failures are classified into the error taxonomy here so the
//! adapter's retry policy sees `ClusterError`, never raw client errors.

use async_trait::async_trait;
use kube::Client;
use serde::Deserialize;

use kagent_common::CallError;
use kagent_tools::ToolHandler;

use crate::adapter::classify_kube_error;
use crate::queries;
use crate::summary;

/// The schema guards shape; this guards the decode. A mismatch between the
/// two is a bug, but it should fail the call, not the process.
fn parse_args<T: for<'de> Deserialize<'de>>(arguments: serde_json::Value) -> Result<T, CallError> {
    serde_json::from_value(arguments).map_err(|e| CallError::InvalidArguments {
        detail: e.to_string(),
    })
}

/// The model tends to send "" for arguments it wants to omit; treat that as
/// absent, like the original CLI did.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn to_payload<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("summary types serialize")
}

// ---------------------------------------------------------------------------
// list_pods
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PodArgs {
    #[serde(default)]
    pod_name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    status_filter: Option<String>,
}

pub struct ListPods {
    client: Client,
}

impl ListPods {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ListPods {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: PodArgs = parse_args(arguments)?;
        let namespace = non_empty(args.namespace);
        let pod_name = non_empty(args.pod_name);
        let unhealthy_only = args.status_filter.as_deref() == Some("unhealthy");

        let pods = match &pod_name {
            Some(name) => {
                queries::fetch_pod_by_name(&self.client, namespace.as_deref(), name).await
            }
            None => queries::fetch_pods(&self.client, namespace.as_deref()).await,
        }
        .map_err(classify_kube_error)?;

        Ok(to_payload(&summary::pod_report(&pods, unhealthy_only)))
    }
}

// ---------------------------------------------------------------------------
// list_nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeArgs {
    #[serde(default)]
    node_name: Option<String>,
}

pub struct ListNodes {
    client: Client,
}

impl ListNodes {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ListNodes {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: NodeArgs = parse_args(arguments)?;
        let name = non_empty(args.node_name);

        let nodes = queries::fetch_nodes(&self.client, name.as_deref())
            .await
            .map_err(classify_kube_error)?;

        let summaries: Vec<_> = nodes.iter().map(summary::summarize_node).collect();
        Ok(to_payload(&summaries))
    }
}

// ---------------------------------------------------------------------------
// list_namespaces
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamespaceArgs {
    #[serde(default)]
    namespace: Option<String>,
}

pub struct ListNamespaces {
    client: Client,
}

impl ListNamespaces {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ListNamespaces {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: NamespaceArgs = parse_args(arguments)?;
        let name = non_empty(args.namespace);

        let namespaces = queries::fetch_namespaces(&self.client, name.as_deref())
            .await
            .map_err(classify_kube_error)?;

        let summaries: Vec<_> = namespaces.iter().map(summary::summarize_namespace).collect();
        Ok(to_payload(&summaries))
    }
}

// ---------------------------------------------------------------------------
// list_events
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventArgs {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    object_name: Option<String>,
}

pub struct ListEvents {
    client: Client,
}

impl ListEvents {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ListEvents {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: EventArgs = parse_args(arguments)?;
        let namespace = non_empty(args.namespace);
        let object_name = non_empty(args.object_name);

        let events = queries::fetch_events(
            &self.client,
            namespace.as_deref(),
            object_name.as_deref(),
        )
        .await
        .map_err(classify_kube_error)?;

        let summaries: Vec<_> = events.iter().map(summary::summarize_event).collect();
        Ok(to_payload(&summaries))
    }
}

// ---------------------------------------------------------------------------
// list_network_policies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkPolicyArgs {
    #[serde(default)]
    namespace: Option<String>,
}

pub struct ListNetworkPolicies {
    client: Client,
}

impl ListNetworkPolicies {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ListNetworkPolicies {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: NetworkPolicyArgs = parse_args(arguments)?;
        let namespace = non_empty(args.namespace);

        let policies = queries::fetch_network_policies(&self.client, namespace.as_deref())
            .await
            .map_err(classify_kube_error)?;

        let summaries: Vec<_> = policies
            .iter()
            .map(summary::summarize_network_policy)
            .collect();
        Ok(to_payload(&summaries))
    }
}

// ---------------------------------------------------------------------------
// get_resource_utilization
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UtilizationArgs {
    #[serde(default)]
    namespace: Option<String>,
}

pub struct GetResourceUtilization {
    client: Client,
}

impl GetResourceUtilization {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GetResourceUtilization {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
        let args: UtilizationArgs = parse_args(arguments)?;
        let namespace = non_empty(args.namespace);

        let pods = queries::fetch_pods(&self.client, namespace.as_deref())
            .await
            .map_err(classify_kube_error)?;

        Ok(to_payload(&summary::utilization_report(&pods)))
    }
}
