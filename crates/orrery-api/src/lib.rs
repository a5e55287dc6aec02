// orrery-api: Async client for ASCOM Alpaca devices.
//
// `AlpacaClient` speaks the per-device REST surface, `ManagementClient`
// the server management endpoints, and `discovery` the UDP probe.

pub mod camera;
pub mod client;
pub mod discovery;
pub mod error;
pub mod focuser;
pub mod management;
pub mod models;
pub mod telescope;
pub mod transport;

pub use client::AlpacaClient;
pub use error::Error;
pub use management::ManagementClient;
pub use models::{AlpacaResponse, CameraState, ConfiguredDevice, DeviceKind, ServerDescription};
pub use transport::TransportConfig;
