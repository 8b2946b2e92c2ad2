pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{CallError, ClusterError, RegistryError};
pub use id::{new_id, CallId, SessionId};
pub use protocol::{CallOutcome, Command, Event, ToolDefinition, PROTOCOL_VERSION};
