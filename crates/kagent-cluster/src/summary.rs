//! Normalized views of cluster objects.
//!
//! Raw API objects are far too noisy to hand to a language model; these
//! summaries keep the fields that matter for diagnosis (phases, container
//! states, restart counts, conditions, policy rules) and render selector
//! logic as short readable phrases.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ContainerState, Event, Namespace, Node, Pod};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyPeer, NetworkPolicyPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Pods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub name: String,
    pub image: String,
    /// "running", "waiting: CrashLoopBackOff", "terminated: OOMKilled", ...
    pub state: String,
    pub ready: bool,
    pub restart_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// kubectl-style status: the first abnormal container reason if any,
    /// otherwise the phase.
    pub status: String,
    pub node_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerSummary>,
    pub restart_count: i32,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PodTotals {
    pub total_pod_count: usize,
    pub pods_by_namespace: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodReport {
    pub items: Vec<PodSummary>,
    pub summary: PodTotals,
}

fn container_state_label(state: Option<&ContainerState>) -> String {
    match state {
        Some(s) => {
            if let Some(waiting) = &s.waiting {
                format!(
                    "waiting: {}",
                    waiting.reason.as_deref().unwrap_or("Waiting")
                )
            } else if let Some(terminated) = &s.terminated {
                format!(
                    "terminated: {}",
                    terminated.reason.as_deref().unwrap_or("Terminated")
                )
            } else if s.running.is_some() {
                "running".to_string()
            } else {
                "unknown".to_string()
            }
        }
        None => "unknown".to_string(),
    }
}

pub fn summarize_pod(pod: &Pod) -> PodSummary {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let labels = pod.metadata.labels.clone().unwrap_or_default();

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    let mut containers = Vec::new();
    for container in pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
    {
        let cs = statuses.iter().find(|cs| cs.name == container.name);
        containers.push(ContainerSummary {
            name: container.name.clone(),
            image: container.image.clone().unwrap_or_default(),
            state: container_state_label(cs.and_then(|cs| cs.state.as_ref())),
            ready: cs.map(|cs| cs.ready).unwrap_or(false),
            restart_count: cs.map(|cs| cs.restart_count).unwrap_or(0),
        });
    }

    // First abnormal container reason wins, mirroring kubectl's STATUS column.
    let display_status = containers
        .iter()
        .find_map(|c| {
            c.state
                .strip_prefix("waiting: ")
                .or_else(|| c.state.strip_prefix("terminated: "))
                .map(String::from)
        })
        .unwrap_or_else(|| phase.clone());

    let restart_count = containers.iter().map(|c| c.restart_count).sum();

    PodSummary {
        name,
        namespace,
        phase,
        status: display_status,
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        labels,
        containers,
        restart_count,
    }
}

/// A pod is unhealthy if its phase is abnormal or any container is not
/// ready/running. Note CrashLoopBackOff pods keep phase `Running`; the
/// container state is what gives them away.
pub fn is_unhealthy(pod: &PodSummary) -> bool {
    match pod.phase.as_str() {
        "Succeeded" => false,
        "Running" => pod
            .containers
            .iter()
            .any(|c| !c.ready || c.state.starts_with("waiting") || c.state.starts_with("terminated")),
        _ => true,
    }
}

pub fn pod_report(pods: &[Pod], unhealthy_only: bool) -> PodReport {
    let items: Vec<PodSummary> = pods
        .iter()
        .map(summarize_pod)
        .filter(|p| !unhealthy_only || is_unhealthy(p))
        .collect();

    let mut summary = PodTotals {
        total_pod_count: items.len(),
        ..Default::default()
    };
    for pod in &items {
        *summary
            .pods_by_namespace
            .entry(pod.namespace.clone())
            .or_insert(0) += 1;
    }

    PodReport { items, summary }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Default)]
pub struct ResourceSnapshot {
    pub cpu_millis: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub pods: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub kubelet_version: String,
    pub unschedulable: bool,
    pub ready: bool,
    /// "Ready=True", "MemoryPressure=False", ...
    pub conditions: Vec<String>,
    pub capacity: ResourceSnapshot,
    pub allocatable: ResourceSnapshot,
}

fn resource_snapshot(quantities: Option<&BTreeMap<String, Quantity>>) -> ResourceSnapshot {
    let Some(map) = quantities else {
        return ResourceSnapshot::default();
    };
    ResourceSnapshot {
        cpu_millis: map.get("cpu").and_then(cpu_millis),
        memory_bytes: map.get("memory").and_then(memory_bytes),
        pods: map.get("pods").and_then(|q| q.0.trim().parse().ok()),
    }
}

pub fn summarize_node(node: &Node) -> NodeSummary {
    let status = node.status.as_ref();

    let conditions: Vec<String> = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|c| format!("{}={}", c.type_, c.status))
        .collect();

    let ready = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True");

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        kubelet_version: status
            .and_then(|s| s.node_info.as_ref())
            .map(|i| i.kubelet_version.clone())
            .unwrap_or_default(),
        unschedulable: node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false),
        ready,
        conditions,
        capacity: resource_snapshot(status.and_then(|s| s.capacity.as_ref())),
        allocatable: resource_snapshot(status.and_then(|s| s.allocatable.as_ref())),
    }
}

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub phase: String,
    pub labels: BTreeMap<String, String>,
}

pub fn summarize_namespace(ns: &Namespace) -> NamespaceSummary {
    NamespaceSummary {
        name: ns.metadata.name.clone().unwrap_or_default(),
        phase: ns
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        labels: ns.metadata.labels.clone().unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub type_: String,
    pub reason: String,
    /// "Pod/nginx-7f" style reference to the involved object.
    pub object: String,
    pub namespace: String,
    pub message: String,
    pub count: i32,
    pub last_seen: Option<String>,
}

pub fn summarize_event(event: &Event) -> EventSummary {
    let object = format!(
        "{}/{}",
        event.involved_object.kind.as_deref().unwrap_or("Unknown"),
        event.involved_object.name.as_deref().unwrap_or("unknown"),
    );

    EventSummary {
        type_: event.type_.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        object,
        namespace: event.metadata.namespace.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        count: event.count.unwrap_or(1),
        last_seen: event.last_timestamp.as_ref().map(|t| t.0.to_rfc3339()),
    }
}

// ---------------------------------------------------------------------------
// Network policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NetworkPolicySummary {
    pub name: String,
    pub namespace: String,
    pub policy_types: Vec<String>,
    pub applies_to: String,
    pub ingress: Vec<String>,
    pub egress: Vec<String>,
}

fn label_phrase(labels: Option<&BTreeMap<String, String>>) -> Option<String> {
    let labels = labels?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn selector_phrase(selector: &LabelSelector, all: &str, labelled: &str) -> String {
    match label_phrase(selector.match_labels.as_ref()) {
        Some(labels) => format!("{labelled} {labels}"),
        None => all.to_string(),
    }
}

fn peer_phrase(peer: &NetworkPolicyPeer) -> String {
    if let Some(block) = &peer.ip_block {
        let mut phrase = format!("cidr {}", block.cidr);
        if let Some(except) = &block.except {
            if !except.is_empty() {
                phrase.push_str(&format!(" except {}", except.join(", ")));
            }
        }
        return phrase;
    }

    let pods = peer
        .pod_selector
        .as_ref()
        .map(|s| selector_phrase(s, "all pods", "pods labelled"));
    let namespaces = peer
        .namespace_selector
        .as_ref()
        .map(|s| selector_phrase(s, "all namespaces", "namespaces labelled"));

    match (pods, namespaces) {
        (Some(p), Some(n)) => format!("{p} in {n}"),
        (Some(p), None) => format!("{p} in this namespace"),
        (None, Some(n)) => n,
        (None, None) => "all sources".to_string(),
    }
}

fn ports_phrase(ports: Option<&[NetworkPolicyPort]>) -> String {
    let Some(ports) = ports.filter(|p| !p.is_empty()) else {
        return "any port".to_string();
    };
    ports
        .iter()
        .map(|p| {
            let protocol = p.protocol.as_deref().unwrap_or("TCP");
            let port = match &p.port {
                Some(IntOrString::Int(n)) => n.to_string(),
                Some(IntOrString::String(s)) => s.clone(),
                None => "any".to_string(),
            };
            match p.end_port {
                Some(end) => format!("{protocol}/{port}-{end}"),
                None => format!("{protocol}/{port}"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn summarize_network_policy(policy: &NetworkPolicy) -> NetworkPolicySummary {
    let name = policy.metadata.name.clone().unwrap_or_default();
    let namespace = policy.metadata.namespace.clone().unwrap_or_default();

    let Some(spec) = policy.spec.as_ref() else {
        return NetworkPolicySummary {
            name,
            namespace,
            policy_types: Vec::new(),
            applies_to: "all pods in the namespace".to_string(),
            ingress: Vec::new(),
            egress: Vec::new(),
        };
    };

    // Absent policyTypes defaults to Ingress, plus Egress when egress rules
    // are present.
    let policy_types = spec.policy_types.clone().unwrap_or_else(|| {
        let mut types = vec!["Ingress".to_string()];
        if spec.egress.is_some() {
            types.push("Egress".to_string());
        }
        types
    });

    let applies_to = selector_phrase(
        &spec.pod_selector,
        "all pods in the namespace",
        "pods labelled",
    );

    let ingress = if policy_types.iter().any(|t| t == "Ingress") {
        match spec.ingress.as_deref() {
            None | Some([]) => {
                vec!["all inbound connections to the selected pods are denied".to_string()]
            }
            Some(rules) => rules
                .iter()
                .map(|rule| {
                    let sources = match rule.from.as_deref() {
                        None | Some([]) => "all sources".to_string(),
                        Some(peers) => peers
                            .iter()
                            .map(peer_phrase)
                            .collect::<Vec<_>>()
                            .join("; "),
                    };
                    format!(
                        "allow inbound from {} on {}",
                        sources,
                        ports_phrase(rule.ports.as_deref())
                    )
                })
                .collect(),
        }
    } else {
        vec!["ingress is not restricted by this policy".to_string()]
    };

    let egress = if policy_types.iter().any(|t| t == "Egress") {
        match spec.egress.as_deref() {
            None | Some([]) => {
                vec!["all outbound connections from the selected pods are denied".to_string()]
            }
            Some(rules) => rules
                .iter()
                .map(|rule| {
                    let destinations = match rule.to.as_deref() {
                        None | Some([]) => "all destinations".to_string(),
                        Some(peers) => peers
                            .iter()
                            .map(peer_phrase)
                            .collect::<Vec<_>>()
                            .join("; "),
                    };
                    format!(
                        "allow outbound to {} on {}",
                        destinations,
                        ports_phrase(rule.ports.as_deref())
                    )
                })
                .collect(),
        }
    } else {
        vec!["egress is not restricted by this policy".to_string()]
    };

    NetworkPolicySummary {
        name,
        namespace,
        policy_types,
        applies_to,
        ingress,
        egress,
    }
}

// ---------------------------------------------------------------------------
// Resource utilization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Default)]
pub struct ResourceTotals {
    pub pods: usize,
    pub cpu_request_millis: u64,
    pub cpu_limit_millis: u64,
    pub memory_request_bytes: u64,
    pub memory_limit_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct UtilizationReport {
    pub by_namespace: BTreeMap<String, ResourceTotals>,
    pub by_node: BTreeMap<String, ResourceTotals>,
}

impl ResourceTotals {
    fn absorb(&mut self, pod: &Pod) {
        self.pods += 1;
        for container in pod
            .spec
            .as_ref()
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
        {
            let Some(resources) = container.resources.as_ref() else {
                continue;
            };
            if let Some(requests) = resources.requests.as_ref() {
                self.cpu_request_millis +=
                    requests.get("cpu").and_then(cpu_millis).unwrap_or(0);
                self.memory_request_bytes +=
                    requests.get("memory").and_then(memory_bytes).unwrap_or(0);
            }
            if let Some(limits) = resources.limits.as_ref() {
                self.cpu_limit_millis += limits.get("cpu").and_then(cpu_millis).unwrap_or(0);
                self.memory_limit_bytes +=
                    limits.get("memory").and_then(memory_bytes).unwrap_or(0);
            }
        }
    }
}

/// Aggregate declared requests/limits per namespace and per node from pod
/// specs. This reflects scheduling pressure, not live usage.
pub fn utilization_report(pods: &[Pod]) -> UtilizationReport {
    let mut report = UtilizationReport::default();
    for pod in pods {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        report
            .by_namespace
            .entry(namespace)
            .or_default()
            .absorb(pod);

        if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) {
            report.by_node.entry(node).or_default().absorb(pod);
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Quantity parsing
// ---------------------------------------------------------------------------

/// CPU quantity → millicores. "100m" → 100, "1" → 1000, "2.5" → 2500.
pub fn cpu_millis(q: &Quantity) -> Option<u64> {
    let s = q.0.trim();
    if let Some(v) = s.strip_suffix('n') {
        v.parse::<f64>().ok().map(|n| (n / 1e6).round() as u64)
    } else if let Some(v) = s.strip_suffix('u') {
        v.parse::<f64>().ok().map(|u| (u / 1e3).round() as u64)
    } else if let Some(v) = s.strip_suffix('m') {
        v.parse::<f64>().ok().map(|m| m.round() as u64)
    } else {
        s.parse::<f64>().ok().map(|c| (c * 1e3).round() as u64)
    }
}

/// Memory quantity → bytes. Handles binary (Ki/Mi/Gi/...) and decimal
/// (k/M/G/...) suffixes as well as plain and scientific notation.
pub fn memory_bytes(q: &Quantity) -> Option<u64> {
    let s = q.0.trim();
    const BINARY: [(&str, u64); 6] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1u64 << 40),
        ("Pi", 1u64 << 50),
        ("Ei", 1u64 << 60),
    ];
    const DECIMAL: [(&str, u64); 6] = [
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
        ("E", 1_000_000_000_000_000_000),
    ];

    for (suffix, factor) in BINARY {
        if let Some(v) = s.strip_suffix(suffix) {
            return v.parse::<f64>().ok().map(|n| (n * factor as f64) as u64);
        }
    }
    for (suffix, factor) in DECIMAL {
        if let Some(v) = s.strip_suffix(suffix) {
            return v.parse::<f64>().ok().map(|n| (n * factor as f64) as u64);
        }
    }
    s.parse::<f64>().ok().map(|n| n as u64)
}
