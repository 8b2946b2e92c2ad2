//! Built-in tool definitions exposed to the model.
//!
//! Every schema sets `additionalProperties: false` so a hallucinated
//! argument fails validation instead of being silently dropped.

use std::sync::Arc;

use kube::Client;

use kagent_common::{RegistryError, ToolDefinition};
use kagent_tools::{ToolDescriptor, ToolRegistry};

use crate::handlers::{
    GetResourceUtilization, ListEvents, ListNamespaces, ListNetworkPolicies, ListNodes, ListPods,
};

/// The read-only inspection tools kagent exposes to AI models.
pub fn builtin_tools(client: Client) -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "list_pods".to_string(),
                description: "Return information about pods: phase, container states, \
                              restart counts, node placement, plus per-namespace totals. \
                              Optionally restrict to one pod, one namespace, or only \
                              unhealthy pods."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pod_name": {
                            "type": "string",
                            "description": "Name of a single pod to look up. Omit for all pods."
                        },
                        "namespace": {
                            "type": "string",
                            "description": "Namespace to search. Omit for all namespaces."
                        },
                        "status_filter": {
                            "type": "string",
                            "enum": ["all", "unhealthy"],
                            "description": "Use 'unhealthy' to keep only pods that are pending, failed, crash-looping, or not ready."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(ListPods::new(client.clone())),
        ),
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "list_nodes".to_string(),
                description: "Return information about cluster nodes: readiness conditions, \
                              capacity and allocatable resources, kubelet version, and \
                              whether the node is cordoned."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "node_name": {
                            "type": "string",
                            "description": "Name of a single node. Omit for all nodes."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(ListNodes::new(client.clone())),
        ),
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "list_namespaces".to_string(),
                description: "Return namespaces in the cluster with their phase and labels."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "namespace": {
                            "type": "string",
                            "description": "Name of a single namespace. Omit for all."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(ListNamespaces::new(client.clone())),
        ),
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "list_events".to_string(),
                description: "Return recent cluster events (scheduling failures, image pull \
                              errors, OOM kills, probe failures). Filter by namespace or by \
                              the name of the involved object."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "namespace": {
                            "type": "string",
                            "description": "Namespace to search. Omit for all namespaces."
                        },
                        "object_name": {
                            "type": "string",
                            "description": "Only events involving this object (e.g. a pod name)."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(ListEvents::new(client.clone())),
        ),
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "list_network_policies".to_string(),
                description: "Return network policies with their pod selectors and readable \
                              ingress/egress rules. Use this to judge whether one pod is \
                              allowed to talk to another."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "namespace": {
                            "type": "string",
                            "description": "Namespace to search. Omit for all namespaces."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(ListNetworkPolicies::new(client.clone())),
        ),
        ToolDescriptor::read_only(
            ToolDefinition {
                name: "get_resource_utilization".to_string(),
                description: "Aggregate declared CPU/memory requests and limits per namespace \
                              and per node from pod specs. Reflects scheduling pressure, not \
                              live usage."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "namespace": {
                            "type": "string",
                            "description": "Namespace to aggregate. Omit for the whole cluster."
                        }
                    },
                    "additionalProperties": false
                }),
            },
            Arc::new(GetResourceUtilization::new(client)),
        ),
    ]
}

/// Build the registry the server shares read-only across sessions.
pub fn build_registry(client: Client) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    for tool in builtin_tools(client) {
        registry.register(tool)?;
    }
    Ok(registry)
}
