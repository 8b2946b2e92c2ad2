//! Read-only execution of inspection tools against a live Kubernetes cluster.
//!
//! The adapter validates arguments, runs the tool's query with bounded
//! retries for transient API failures, and enforces a cumulative per-call
//! timeout budget. Query results are normalized into compact summaries the
//! model can reason over instead of raw API objects.

pub mod adapter;
pub mod definitions;
pub mod handlers;
pub mod queries;
pub mod retry;
pub mod summary;

pub use adapter::{classify_kube_error, ClusterAdapter};
pub use definitions::{build_registry, builtin_tools};
pub use retry::RetryPolicy;
