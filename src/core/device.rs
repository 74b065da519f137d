//! Device: one controller, its point catalog and its poller
//!
//! A Device is built once per controller. Construction runs discovery,
//! afterwards the catalog never changes shape. Reads go through the
//! batcher (history) or through single point reads (cached value).

use super::batch::{BatchReport, ReadBatcher, DEFAULT_BATCH_SIZE};
use super::catalog::{DiscoveryConfig, PointCatalog};
use super::controller::Controller;
use super::error::{Error, Result};
use super::network::{Network, Value};
use super::point::Point;
use super::poll::{PollCommand, PollController, PollCycle, PollState, PollStats, DEFAULT_POLL_INTERVAL};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Network address of the controller
    pub address: String,
    /// Device instance
    pub device_id: u32,
    /// Discovery options
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Points per batched request
    pub batch_size: usize,
    /// Interval used when polling is started without one
    pub default_poll_interval: Duration,
}

impl DeviceConfig {
    /// Create a configuration with default batching and polling
    pub fn new(address: &str, device_id: u32) -> Self {
        Self {
            address: address.to_string(),
            device_id,
            discovery: DiscoveryConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            default_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set discovery options
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Set points per batched request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the default poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.default_poll_interval = interval;
        self
    }
}

/// Reads every point of the catalog in one batched pass
struct DeviceCycle {
    controller: Arc<Controller>,
    catalog: Arc<PointCatalog>,
    batch_size: usize,
}

#[async_trait]
impl PollCycle for DeviceCycle {
    async fn run_cycle(&self) -> Result<()> {
        let names = self.catalog.names();
        let report = ReadBatcher::new(&self.controller, &self.catalog)
            .with_batch_size(self.batch_size)
            .read_multiple(&names)
            .await?;
        debug!("Poll of {}: {}", self.catalog.name(), report.summary());
        Ok(())
    }
}

/// A discovered controller
pub struct Device {
    controller: Arc<Controller>,
    catalog: Arc<PointCatalog>,
    poller: Mutex<PollController>,
    batch_size: usize,
}

impl Device {
    /// Discover a controller with default configuration
    pub async fn connect(address: &str, device_id: u32, network: Arc<dyn Network>) -> Result<Self> {
        Self::connect_with_config(DeviceConfig::new(address, device_id), network).await
    }

    /// Discover a controller with full configuration
    pub async fn connect_with_config(config: DeviceConfig, network: Arc<dyn Network>) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".to_string()));
        }

        let controller = Arc::new(Controller::new(config.address, config.device_id, network));
        let catalog = Arc::new(PointCatalog::discover(&controller, &config.discovery).await?);

        let cycle = Arc::new(DeviceCycle {
            controller: controller.clone(),
            catalog: catalog.clone(),
            batch_size: config.batch_size,
        });
        let poller = PollController::new(cycle).with_default_interval(config.default_poll_interval);

        Ok(Self {
            controller,
            catalog,
            poller: Mutex::new(poller),
            batch_size: config.batch_size,
        })
    }

    /// Device name, `Not Found` if the controller did not answer discovery
    pub fn name(&self) -> &str {
        self.catalog.name()
    }

    /// Network address
    pub fn address(&self) -> &str {
        self.controller.address()
    }

    /// Device instance
    pub fn device_id(&self) -> u32 {
        self.controller.device_id()
    }

    /// Controller handle
    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Point catalog
    pub fn catalog(&self) -> &PointCatalog {
        &self.catalog
    }

    /// Points per batched request
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Look up a point and refresh its cached value with one read
    pub async fn get(&self, name: &str) -> Result<Arc<Point>> {
        self.lookup(name, true).await
    }

    /// Look up a point, optionally refreshing its cached value first.
    /// An unknown name fails before any request is made.
    pub async fn lookup(&self, name: &str, force_read: bool) -> Result<Arc<Point>> {
        let point = self.catalog.resolve(name)?.clone();
        if force_read {
            point.read().await?;
        }
        Ok(point)
    }

    /// Look up a point without reading it
    pub fn point(&self, name: &str) -> Result<&Arc<Point>> {
        self.catalog.resolve(name)
    }

    /// Read the present value of one point
    pub async fn read(&self, name: &str) -> Result<Value> {
        self.catalog.resolve(name)?.read().await
    }

    /// Batched read of the named points, appending to their history
    pub async fn read_multiple<S: AsRef<str>>(&self, names: &[S]) -> Result<BatchReport> {
        self.read_multiple_with(names, self.batch_size).await
    }

    /// Batched read with an explicit batch size
    pub async fn read_multiple_with<S: AsRef<str>>(&self, names: &[S], batch_size: usize) -> Result<BatchReport> {
        ReadBatcher::new(&self.controller, &self.catalog)
            .with_batch_size(batch_size)
            .read_multiple(names)
            .await
    }

    /// Batched read of every point, in discovery order
    pub async fn read_all(&self) -> Result<BatchReport> {
        self.read_multiple(&self.catalog.names()).await
    }

    /// Iterate points in discovery order
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Point>> {
        self.catalog.iter()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Check if the device has no points
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Points currently flagged as simulated, in discovery order
    pub fn simulated_points(&self) -> impl Iterator<Item = &Arc<Point>> + '_ {
        self.catalog.simulated()
    }

    /// Apply a poll command: an interval, `0`/`false`/`"stop"` to stop,
    /// `true` to poll at the default interval
    pub fn poll(&self, command: impl Into<PollCommand>) -> Result<PollState> {
        self.poller.lock().apply(command)
    }

    /// Start polling at `interval`, restarting if already polling
    pub fn start_polling(&self, interval: Duration) -> Result<PollState> {
        self.poller.lock().start(interval)
    }

    /// Stop polling
    pub fn stop_polling(&self) -> PollState {
        self.poller.lock().stop()
    }

    /// Current poll state
    pub fn poll_state(&self) -> PollState {
        self.poller.lock().state()
    }

    /// Poller statistics
    pub fn poll_stats(&self) -> PollStats {
        self.poller.lock().stats()
    }
}

impl<'a> IntoIterator for &'a Device {
    type Item = &'a Arc<Point>;
    type IntoIter = std::slice::Iter<'a, Arc<Point>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("controller", &self.controller)
            .field("name", &self.name())
            .field("points", &self.len())
            .field("poll_state", &self.poll_state())
            .finish()
    }
}
