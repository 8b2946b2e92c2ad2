//! Thin fetch layer over the kube client.
//!
//! Every function here is a read (list/get); nothing in this crate mutates
//! cluster state. Summarization lives in [`crate::summary`] so it stays
//! testable without a cluster.

use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::ListParams;
use kube::{Api, Client};

fn pods_api(client: &Client, namespace: Option<&str>) -> Api<Pod> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

pub async fn fetch_pods(
    client: &Client,
    namespace: Option<&str>,
) -> Result<Vec<Pod>, kube::Error> {
    let api = pods_api(client, namespace);
    Ok(api.list(&ListParams::default()).await?.items)
}

/// Fetch one pod by name. With a namespace this is a direct get (a missing
/// pod surfaces as NotFound); without one, all namespaces are searched.
pub async fn fetch_pod_by_name(
    client: &Client,
    namespace: Option<&str>,
    name: &str,
) -> Result<Vec<Pod>, kube::Error> {
    match namespace {
        Some(ns) => {
            let api: Api<Pod> = Api::namespaced(client.clone(), ns);
            Ok(vec![api.get(name).await?])
        }
        None => {
            let pods = fetch_pods(client, None).await?;
            Ok(pods
                .into_iter()
                .filter(|p| p.metadata.name.as_deref() == Some(name))
                .collect())
        }
    }
}

pub async fn fetch_nodes(
    client: &Client,
    name: Option<&str>,
) -> Result<Vec<Node>, kube::Error> {
    let api: Api<Node> = Api::all(client.clone());
    match name {
        Some(n) => Ok(vec![api.get(n).await?]),
        None => Ok(api.list(&ListParams::default()).await?.items),
    }
}

pub async fn fetch_namespaces(
    client: &Client,
    name: Option<&str>,
) -> Result<Vec<Namespace>, kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    match name {
        Some(n) => Ok(vec![api.get(n).await?]),
        None => Ok(api.list(&ListParams::default()).await?.items),
    }
}

pub async fn fetch_events(
    client: &Client,
    namespace: Option<&str>,
    object_name: Option<&str>,
) -> Result<Vec<Event>, kube::Error> {
    let api: Api<Event> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let mut params = ListParams::default();
    if let Some(name) = object_name {
        params = params.fields(&format!("involvedObject.name={name}"));
    }
    Ok(api.list(&params).await?.items)
}

pub async fn fetch_network_policies(
    client: &Client,
    namespace: Option<&str>,
) -> Result<Vec<NetworkPolicy>, kube::Error> {
    let api: Api<NetworkPolicy> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    Ok(api.list(&ListParams::default()).await?.items)
}
