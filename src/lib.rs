//! # Bacpoll Core Library
//!
//! Models one networked field controller on a building-automation network:
//! - Point discovery from the controller's object inventory
//! - Name-indexed point catalog with discovery-order iteration
//! - Batched multi-point reads with bounded request size
//! - Background polling with a restart-safe Stopped/Running state machine
//! - Simulated controller for tests and offline use
//! - CLI with exit codes and text/JSON/CSV output
//!
//! ## Example
//!
//! ```rust,no_run
//! use bacpoll_core::{ControllerFixture, Device, SimulatedController};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fixture = ControllerFixture::load("demos/controller.toml".as_ref())?;
//!     let network = Arc::new(SimulatedController::new(fixture));
//!     let device = Device::connect("2:5", 5, network).await?;
//!
//!     for point in &device {
//!         println!("{}", point);
//!     }
//!
//!     device.start_polling(Duration::from_secs(10))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ControllerProfile};
pub use crate::core::batch::{BatchReport, ReadBatcher, DEFAULT_BATCH_SIZE};
pub use crate::core::catalog::{DiscoveryConfig, InventoryEntry, PointCatalog, NOT_FOUND_NAME};
pub use crate::core::controller::Controller;
pub use crate::core::device::{Device, DeviceConfig};
pub use crate::core::error::{Error, Result};
pub use crate::core::network::{
    ControllerFixture, FixtureError, Network, NetworkError, ObjectFixture, ObjectId, SimulatedController, SimulatorStats, Value,
};
pub use crate::core::point::{Point, PointFamily, PointKind, TrendSample};
pub use crate::core::poll::{PollCommand, PollController, PollCycle, PollState, PollStats, DEFAULT_POLL_INTERVAL};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
