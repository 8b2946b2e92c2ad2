//! Tool registry for cluster-inspection capabilities.
//!
//! A tool is a named, schema-described, read-only capability the model can
//! invoke. Descriptors are registered once at server start; after that the
//! registry is immutable and shared read-only across sessions, so lookups
//! need no locking.

mod registry;

pub use registry::{RegisteredTool, ToolRegistry};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use kagent_common::{CallError, ToolDefinition};

/// Executes one tool's logic. Implementations must be read-only against the
/// cluster and idempotent, since the adapter retries transient failures.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError>;
}

/// A registered inspection capability: catalog entry plus execution handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    /// Declared intent, enforced at registration. The registry refuses
    /// descriptors that do not set this.
    pub read_only: bool,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// Build a read-only descriptor, the only kind this system supports.
    pub fn read_only(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            definition,
            read_only: true,
            handler,
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.definition.name)
            .field("read_only", &self.read_only)
            .finish()
    }
}
