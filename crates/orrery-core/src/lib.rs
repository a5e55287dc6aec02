// orrery-core: Device resolution and connection lifecycle over orrery-api.

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod model;
pub mod resolver;
mod retry;
pub mod session;
pub mod store;
pub mod tools;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{ManagerConfig, RetryConfig, StaticDevice};
pub use discovery::{DiscoveryReport, Probe, ProbeFailure};
pub use error::{
    CommandError, ConnectionError, CoreError, PersistenceError, ResolutionError, ToolError,
    ValidationError,
};
pub use manager::{Connection, ConnectionManager, DeviceInfo, InitParams};
pub use model::{ConnectionInfo, ConnectionState, DeviceKind, DeviceRecord, RecordSource};
pub use session::{Capabilities, CapabilitySurface, DeviceStatus};
pub use store::DeviceStore;
pub use tools::{CameraTools, DiscoveryTools, TelescopeTools, ToolResponse, ToolResult};
