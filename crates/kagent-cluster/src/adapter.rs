//! Tool execution with argument validation, bounded retries, and a
//! cumulative timeout budget.

use std::time::Duration;

use tracing::{debug, warn};

use kagent_common::{CallError, ClusterError};
use kagent_tools::RegisteredTool;

use crate::retry::RetryPolicy;

/// Map a kube client failure onto the error taxonomy. API responses are
/// classified by status code; everything below the API layer (connection
/// reset, timeout, TLS) is treated as transient.
pub fn classify_kube_error(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            401 | 403 => ClusterError::PermissionDenied {
                detail: resp.message,
            },
            404 => ClusterError::NotFound {
                detail: resp.message,
            },
            429 => ClusterError::Transient {
                detail: resp.message,
            },
            code if code >= 500 => ClusterError::Transient {
                detail: resp.message,
            },
            code => ClusterError::Upstream {
                code,
                detail: resp.message,
            },
        },
        other => ClusterError::Transient {
            detail: other.to_string(),
        },
    }
}

/// Executes registered tools against the cluster. The adapter itself holds
/// no cluster connection; handlers own their client clones, the adapter owns
/// the execution policy.
pub struct ClusterAdapter {
    retry: RetryPolicy,
}

impl ClusterAdapter {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Run one tool call. Arguments are checked against the tool's schema
    /// before any cluster traffic. The retry loop runs under a single
    /// timeout, so the budget is cumulative across attempts; expiry drops
    /// the in-flight query rather than leaving it running.
    pub async fn execute(
        &self,
        tool: &RegisteredTool,
        arguments: serde_json::Value,
        budget: Duration,
    ) -> Result<serde_json::Value, CallError> {
        tool.validate_arguments(&arguments)?;

        match tokio::time::timeout(budget, self.run_with_retry(tool, &arguments)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %tool.name(), budget_ms = budget.as_millis() as u64, "Call budget exceeded");
                Err(CallError::DeadlineExceeded {
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    async fn run_with_retry(
        &self,
        tool: &RegisteredTool,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        let mut retries_done = 0;
        loop {
            match tool.handler().run(arguments.clone()).await {
                Ok(payload) => return Ok(payload),
                Err(CallError::Cluster { cause }) if self.retry.should_retry(&cause, retries_done) => {
                    retries_done += 1;
                    let delay = self.retry.delay_for(retries_done);
                    debug!(
                        tool = %tool.name(),
                        retry = retries_done,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "Transient cluster error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for ClusterAdapter {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use kagent_common::ToolDefinition;
    use kagent_tools::{ToolDescriptor, ToolHandler, ToolRegistry};

    /// Handler that fails `failures` times with the given error, then
    /// succeeds.
    struct FlakyHandler {
        failures: u32,
        error: ClusterError,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for FlakyHandler {
        async fn run(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(self.error.clone().into())
            } else {
                Ok(serde_json::json!({"attempt": attempt + 1}))
            }
        }
    }

    /// Handler whose query never returns.
    struct StuckHandler;

    #[async_trait]
    impl ToolHandler for StuckHandler {
        async fn run(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
            futures_pending().await;
            unreachable!()
        }
    }

    async fn futures_pending() {
        std::future::pending::<()>().await
    }

    fn registry_with(handler: Arc<dyn ToolHandler>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::read_only(
                ToolDefinition {
                    name: "probe".into(),
                    description: "test probe".into(),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": {},
                        "additionalProperties": false
                    }),
                },
                handler,
            ))
            .unwrap();
        registry
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn transient_errors_retried_then_succeed() {
        let attempts = Arc::new(AtomicU32::new(0));
        let registry = registry_with(Arc::new(FlakyHandler {
            failures: 2,
            error: ClusterError::Transient {
                detail: "connection reset".into(),
            },
            attempts: Arc::clone(&attempts),
        }));
        let adapter = ClusterAdapter::new(fast_policy());

        let tool = registry.lookup("probe").unwrap();
        let payload = adapter
            .execute(tool, serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(payload["attempt"], 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_errors_surface_when_retries_exhaust() {
        let attempts = Arc::new(AtomicU32::new(0));
        let registry = registry_with(Arc::new(FlakyHandler {
            failures: 10,
            error: ClusterError::Transient {
                detail: "timeout".into(),
            },
            attempts: Arc::clone(&attempts),
        }));
        let adapter = ClusterAdapter::new(fast_policy());

        let tool = registry.lookup("probe").unwrap();
        let err = adapter
            .execute(tool, serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CallError::Cluster {
                cause: ClusterError::Transient { .. }
            }
        ));
        // Initial attempt + 2 retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let registry = registry_with(Arc::new(FlakyHandler {
            failures: 10,
            error: ClusterError::PermissionDenied {
                detail: "secrets is forbidden".into(),
            },
            attempts: Arc::clone(&attempts),
        }));
        let adapter = ClusterAdapter::new(fast_policy());

        let tool = registry.lookup("probe").unwrap();
        let err = adapter
            .execute(tool, serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CallError::Cluster {
                cause: ClusterError::PermissionDenied { .. }
            }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stuck_query_fails_with_deadline_exceeded() {
        let registry = registry_with(Arc::new(StuckHandler));
        let adapter = ClusterAdapter::new(fast_policy());

        let tool = registry.lookup("probe").unwrap();
        let err = adapter
            .execute(tool, serde_json::json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert_eq!(err, CallError::DeadlineExceeded { budget_ms: 20 });
    }

    #[tokio::test]
    async fn invalid_arguments_rejected_before_execution() {
        let attempts = Arc::new(AtomicU32::new(0));
        let registry = registry_with(Arc::new(FlakyHandler {
            failures: 0,
            error: ClusterError::Transient { detail: "".into() },
            attempts: Arc::clone(&attempts),
        }));
        let adapter = ClusterAdapter::new(fast_policy());

        let tool = registry.lookup("probe").unwrap();
        let err = adapter
            .execute(
                tool,
                serde_json::json!({"surprise": true}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::InvalidArguments { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn api_errors_classified_by_code() {
        let resp = |code: u16, message: &str| {
            kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".into(),
                message: message.into(),
                reason: "".into(),
                code,
            })
        };

        assert!(matches!(
            classify_kube_error(resp(403, "forbidden")),
            ClusterError::PermissionDenied { .. }
        ));
        assert!(matches!(
            classify_kube_error(resp(404, "not found")),
            ClusterError::NotFound { .. }
        ));
        assert!(matches!(
            classify_kube_error(resp(429, "slow down")),
            ClusterError::Transient { .. }
        ));
        assert!(matches!(
            classify_kube_error(resp(503, "apiserver unavailable")),
            ClusterError::Transient { .. }
        ));
        assert!(matches!(
            classify_kube_error(resp(422, "unprocessable")),
            ClusterError::Upstream { code: 422, .. }
        ));
    }
}
