//! Registration, lookup, and argument validation.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::JSONSchema;

use kagent_common::{CallError, RegistryError, ToolDefinition};

use crate::{ToolDescriptor, ToolHandler};

/// A descriptor whose parameter schema compiled at registration time.
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    schema: JSONSchema,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name())
            .finish()
    }
}

impl RegisteredTool {
    pub fn definition(&self) -> &ToolDefinition {
        &self.descriptor.definition
    }

    pub fn name(&self) -> &str {
        &self.descriptor.definition.name
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.descriptor.handler)
    }

    /// Check arguments against the tool's parameter schema. Tool schemas set
    /// `additionalProperties: false`, so hallucinated fields fail here before
    /// any cluster traffic happens.
    pub fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), CallError> {
        if let Err(errors) = self.schema.validate(arguments) {
            let detail = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CallError::InvalidArguments { detail });
        }
        Ok(())
    }
}

/// Immutable-after-startup mapping of tool name → registered tool.
///
/// `list()` preserves registration order so the catalog the model sees is
/// stable across calls within a process lifetime.
#[derive(Default)]
pub struct ToolRegistry {
    index: HashMap<String, usize>,
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails on duplicate names, on descriptors that do not
    /// declare read-only intent, and on parameter schemas that do not
    /// compile — all at startup, never at call time.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.definition.name.clone();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        if !descriptor.read_only {
            return Err(RegistryError::MutatingTool(name));
        }
        let schema = JSONSchema::compile(&descriptor.definition.parameters).map_err(|e| {
            RegistryError::InvalidSchema {
                name: name.clone(),
                detail: e.to_string(),
            }
        })?;

        tracing::debug!(tool = %name, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { descriptor, schema });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// All registered tools, in registration order.
    pub fn list(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    /// The serializable catalog advertised to clients and the model.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
