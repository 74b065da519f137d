//! Addressing context shared by a device and its points

use super::error::Result;
use super::network::{property_query, Network, ObjectId, Value, DEVICE_OBJECT};
use std::fmt;
use std::sync::Arc;

/// One controller on the network: its address, device instance and the
/// network capability used to reach it.
pub struct Controller {
    address: String,
    device_id: u32,
    network: Arc<dyn Network>,
}

impl Controller {
    /// Create a new controller handle
    pub fn new(address: impl Into<String>, device_id: u32, network: Arc<dyn Network>) -> Self {
        Self {
            address: address.into(),
            device_id,
            network,
        }
    }

    /// Network address (e.g. `2:5` or `192.168.1.20`)
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Device instance
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Network capability
    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Identifier of the device object itself
    pub fn device_object(&self) -> ObjectId {
        ObjectId::new(DEVICE_OBJECT, self.device_id)
    }

    /// Read one property of one object
    pub async fn read_property(&self, object: &ObjectId, property: &str) -> Result<Value> {
        let query = property_query(&self.address, object, &[property]);
        Ok(self.network.read(&query).await?)
    }

    /// Read several properties of one object in a single request
    pub async fn read_properties(&self, object: &ObjectId, properties: &[&str]) -> Result<Vec<Value>> {
        let query = property_query(&self.address, object, properties);
        Ok(self.network.read_multiple(&query).await?)
    }

    /// Send a prepared multi-read query
    pub async fn read_multiple(&self, query: &str) -> Result<Vec<Value>> {
        Ok(self.network.read_multiple(query).await?)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("address", &self.address)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}
