//! Simulated controller
//!
//! An in-memory [`Network`] implementation answering queries from a fixture
//! of objects and properties. Used for tests, benches and the CLI when no
//! real protocol stack is attached.

use super::{Network, NetworkError, ObjectId, Value, DEVICE_OBJECT};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Default protocol-services-supported answer
const DEFAULT_SERVICES: &str = "readProperty readPropertyMultiple writeProperty";

/// Fixture loading errors
#[derive(Error, Debug)]
pub enum FixtureError {
    /// File could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid fixture
    #[error("Invalid fixture: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A simulated controller definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerFixture {
    /// Device object name
    pub name: String,
    /// Network address the controller answers on
    pub address: String,
    /// Device instance
    pub device_id: u32,
    /// Protocol-services-supported answer
    #[serde(default = "default_services")]
    pub services_supported: String,
    /// Objects, in inventory order
    #[serde(default)]
    pub objects: Vec<ObjectFixture>,
}

fn default_services() -> String {
    DEFAULT_SERVICES.to_string()
}

impl ControllerFixture {
    /// Create an empty controller
    pub fn new(name: &str, address: &str, device_id: u32) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            device_id,
            services_supported: default_services(),
            objects: Vec::new(),
        }
    }

    /// Add an object
    pub fn with_object(mut self, object: ObjectFixture) -> Self {
        self.objects.push(object);
        self
    }

    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, FixtureError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// A simulated object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFixture {
    /// Object type as reported in the object list. Text for standard types,
    /// a number for proprietary ones, absent for broken entries.
    #[serde(default)]
    pub object_type: Option<Value>,
    /// Object instance
    pub instance: u32,
    /// Reject writes with access-denied
    #[serde(default)]
    pub read_only: bool,
    /// Property values by property name
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl ObjectFixture {
    /// Create an object of a standard type with no properties
    pub fn new(object_type: &str, instance: u32) -> Self {
        Self {
            object_type: Some(Value::from(object_type)),
            instance,
            read_only: false,
            properties: BTreeMap::new(),
        }
    }

    /// Create an object whose type is not symbolic (or missing)
    pub fn with_raw_type(object_type: Option<Value>, instance: u32) -> Self {
        Self {
            object_type,
            instance,
            read_only: false,
            properties: BTreeMap::new(),
        }
    }

    /// Analog object with name, value and units
    pub fn numeric(object_type: &str, instance: u32, name: &str, value: f64, units: &str) -> Self {
        Self::new(object_type, instance)
            .property("objectName", name)
            .property("description", format!("{} ({})", name, object_type))
            .property("presentValue", value)
            .property("units", units)
    }

    /// Binary object with name, value and state texts
    pub fn binary(object_type: &str, instance: u32, name: &str, active: bool) -> Self {
        Self::new(object_type, instance)
            .property("objectName", name)
            .property("description", format!("{} ({})", name, object_type))
            .property("presentValue", if active { "active" } else { "inactive" })
            .property("inactiveText", "Off")
            .property("activeText", "On")
    }

    /// Multi-state object with name, 1-based value and state table
    pub fn multi_state(object_type: &str, instance: u32, name: &str, value: u32, states: &[&str]) -> Self {
        Self::new(object_type, instance)
            .property("objectName", name)
            .property("description", format!("{} ({})", name, object_type))
            .property("presentValue", value)
            .property("stateText", states.to_vec())
    }

    /// Set a property
    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Mark the object as read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn matches(&self, object_type: &str, instance: u32) -> bool {
        self.instance == instance
            && matches!(&self.object_type, Some(Value::Text(t)) if t == object_type)
    }
}

/// Counters for requests answered by the simulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    /// Single-property reads
    pub reads: u64,
    /// Multi-property reads
    pub multi_reads: u64,
    /// Writes
    pub writes: u64,
    /// Requests answered with "unreachable"
    pub unreachable: u64,
    /// Highest number of requests observed in flight at once
    pub max_in_flight: usize,
}

/// Decrements the in-flight counter when a request completes
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory controller implementing [`Network`]
pub struct SimulatedController {
    fixture: RwLock<ControllerFixture>,
    reachable: AtomicBool,
    latency: RwLock<Duration>,
    requests: RwLock<Vec<String>>,
    reads: AtomicU64,
    multi_reads: AtomicU64,
    writes: AtomicU64,
    unreachable: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimulatedController {
    /// Create a simulator for the given fixture
    pub fn new(fixture: ControllerFixture) -> Self {
        Self {
            fixture: RwLock::new(fixture),
            reachable: AtomicBool::new(true),
            latency: RwLock::new(Duration::ZERO),
            requests: RwLock::new(Vec::new()),
            reads: AtomicU64::new(0),
            multi_reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Load a simulator from a fixture file
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        Ok(Self::new(ControllerFixture::load(path)?))
    }

    /// Address the simulated controller answers on
    pub fn address(&self) -> String {
        self.fixture.read().address.clone()
    }

    /// Device instance of the simulated controller
    pub fn device_id(&self) -> u32 {
        self.fixture.read().device_id
    }

    /// Take the controller on or off the network
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay applied to every request
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Change the present value of an object. Returns false for unknown objects.
    pub fn set_present_value(&self, object_type: &str, instance: u32, value: impl Into<Value>) -> bool {
        self.set_property(object_type, instance, "presentValue", value)
    }

    /// Change any property of an object. Returns false for unknown objects.
    pub fn set_property(&self, object_type: &str, instance: u32, property: &str, value: impl Into<Value>) -> bool {
        let mut fixture = self.fixture.write();
        match fixture.objects.iter_mut().find(|o| o.matches(object_type, instance)) {
            Some(object) => {
                object.properties.insert(property.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    /// All queries received so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.read().clone()
    }

    /// Multi-property queries received so far
    pub fn multi_read_requests(&self) -> Vec<String> {
        self.requests
            .read()
            .iter()
            .filter_map(|r| r.strip_prefix("RPM ").map(str::to_string))
            .collect()
    }

    /// Forget the request log
    pub fn clear_requests(&self) {
        self.requests.write().clear();
    }

    /// Request counters
    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            reads: self.reads.load(Ordering::SeqCst),
            multi_reads: self.multi_reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            unreachable: self.unreachable.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }

    async fn begin(&self, kind: &str, query: &str) -> Result<InFlight<'_>, NetworkError> {
        self.requests.write().push(format!("{} {}", kind, query));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let latency = *self.latency.read();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            self.unreachable.fetch_add(1, Ordering::SeqCst);
            return Err(NetworkError::Unreachable(query.to_string()));
        }
        Ok(guard)
    }

    /// Split a query into its address and (object, properties) groups.
    /// A token followed by an instance number starts a new group.
    fn parse_query(query: &str) -> Result<(String, Vec<(ObjectId, Vec<String>)>), NetworkError> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let (address, rest) = tokens
            .split_first()
            .ok_or_else(|| NetworkError::Protocol("empty request".to_string()))?;

        let mut groups = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            let object_type = rest[i];
            let instance = rest
                .get(i + 1)
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or_else(|| NetworkError::Protocol(format!("missing instance after {}", object_type)))?;
            i += 2;

            let mut properties = Vec::new();
            while i < rest.len() {
                let starts_group = rest.get(i + 1).is_some_and(|t| t.parse::<u32>().is_ok());
                if starts_group {
                    break;
                }
                properties.push(rest[i].to_string());
                i += 1;
            }
            if properties.is_empty() {
                return Err(NetworkError::Protocol(format!(
                    "no property requested for {} {}",
                    object_type, instance
                )));
            }
            groups.push((ObjectId::new(object_type, instance), properties));
        }

        if groups.is_empty() {
            return Err(NetworkError::Protocol(format!("no object in request: {}", query)));
        }
        Ok((address.to_string(), groups))
    }

    fn check_address(&self, address: &str) -> Result<(), NetworkError> {
        if self.fixture.read().address == address {
            Ok(())
        } else {
            self.unreachable.fetch_add(1, Ordering::SeqCst);
            Err(NetworkError::Unreachable(format!("no controller at {}", address)))
        }
    }

    fn property_value(&self, object: &ObjectId, property: &str) -> Result<Value, NetworkError> {
        let fixture = self.fixture.read();

        if object.object_type == DEVICE_OBJECT && object.instance == fixture.device_id {
            return match property {
                "objectName" => Ok(Value::from(fixture.name.as_str())),
                "protocolServicesSupported" => Ok(Value::from(fixture.services_supported.as_str())),
                "objectList" => {
                    let mut list = vec![Value::List(vec![
                        Value::from(DEVICE_OBJECT),
                        Value::from(fixture.device_id),
                    ])];
                    list.extend(fixture.objects.iter().map(|o| {
                        Value::List(vec![
                            o.object_type.clone().unwrap_or(Value::Null),
                            Value::from(o.instance),
                        ])
                    }));
                    Ok(Value::List(list))
                }
                other => Err(NetworkError::Protocol(format!("unknown-property {} on {}", other, object))),
            };
        }

        let found = fixture
            .objects
            .iter()
            .find(|o| o.matches(&object.object_type, object.instance))
            .ok_or_else(|| NetworkError::Protocol(format!("unknown-object {}", object)))?;

        found
            .properties
            .get(property)
            .cloned()
            .ok_or_else(|| NetworkError::Protocol(format!("unknown-property {} on {}", property, object)))
    }
}

#[async_trait]
impl Network for SimulatedController {
    async fn read(&self, query: &str) -> Result<Value, NetworkError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let _guard = self.begin("RP", query).await?;

        let (address, groups) = Self::parse_query(query)?;
        self.check_address(&address)?;
        match groups.as_slice() {
            [(object, properties)] if properties.len() == 1 => self.property_value(object, &properties[0]),
            _ => Err(NetworkError::Protocol(format!(
                "single read expects one property: {}",
                query
            ))),
        }
    }

    async fn read_multiple(&self, query: &str) -> Result<Vec<Value>, NetworkError> {
        self.multi_reads.fetch_add(1, Ordering::SeqCst);
        let _guard = self.begin("RPM", query).await?;

        let (address, groups) = Self::parse_query(query)?;
        self.check_address(&address)?;

        let mut values = Vec::new();
        for (object, properties) in &groups {
            for property in properties {
                values.push(self.property_value(object, property)?);
            }
        }
        Ok(values)
    }

    async fn write(&self, query: &str) -> Result<(), NetworkError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let _guard = self.begin("WP", query).await?;

        // <address> <type> <instance> <property> <value> [- <priority>]
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let [address, object_type, instance, property, value, ..] = tokens.as_slice() else {
            return Err(NetworkError::Protocol(format!("malformed write: {}", query)));
        };
        self.check_address(address)?;
        let instance: u32 = instance
            .parse()
            .map_err(|_| NetworkError::Protocol(format!("bad instance in write: {}", query)))?;

        let value = match *value {
            "null" => Value::Null,
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            v => v
                .parse::<u64>()
                .map(Value::Unsigned)
                .or_else(|_| v.parse::<f64>().map(Value::Real))
                .unwrap_or_else(|_| Value::from(v)),
        };

        let mut fixture = self.fixture.write();
        let object = fixture
            .objects
            .iter_mut()
            .find(|o| o.matches(object_type, instance))
            .ok_or_else(|| NetworkError::Protocol(format!("unknown-object {} {}", object_type, instance)))?;
        if object.read_only {
            return Err(NetworkError::AccessDenied(format!("{} {} {}", object_type, instance, property)));
        }
        object.properties.insert(property.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SimulatedController {
        SimulatedController::new(
            ControllerFixture::new("AHU-1", "2:5", 5005)
                .with_object(ObjectFixture::numeric("analogInput", 1, "OAT", 21.5, "degreesCelsius"))
                .with_object(ObjectFixture::binary("binaryOutput", 2, "FAN", true).read_only()),
        )
    }

    #[tokio::test]
    async fn test_device_properties() {
        let sim = controller();
        let name = sim.read("2:5 device 5005 objectName").await.unwrap();
        assert_eq!(name, Value::from("AHU-1"));

        let list = sim.read("2:5 device 5005 objectList").await.unwrap();
        let list = list.as_list().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], Value::List(vec![Value::from("analogInput"), Value::from(1u32)]));
    }

    #[tokio::test]
    async fn test_read_multiple_groups() {
        let sim = controller();
        let values = sim
            .read_multiple("2:5 analogInput 1 presentValue units binaryOutput 2 presentValue")
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Value::Real(21.5), Value::from("degreesCelsius"), Value::from("active")]
        );
        assert_eq!(sim.stats().multi_reads, 1);
        assert_eq!(sim.multi_read_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_and_wrong_address() {
        let sim = controller();
        let err = sim.read("9:9 device 5005 objectName").await.unwrap_err();
        assert!(matches!(err, NetworkError::Unreachable(_)));

        sim.set_reachable(false);
        let err = sim.read("2:5 device 5005 objectName").await.unwrap_err();
        assert!(matches!(err, NetworkError::Unreachable(_)));
        assert_eq!(sim.stats().unreachable, 2);
    }

    #[tokio::test]
    async fn test_unknown_property() {
        let sim = controller();
        let err = sim.read("2:5 analogInput 1 stateText").await.unwrap_err();
        assert!(matches!(err, NetworkError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_write_and_access_denied() {
        let sim = controller();
        sim.write("2:5 analogInput 1 presentValue 18.5 - 8").await.unwrap();
        assert_eq!(sim.read("2:5 analogInput 1 presentValue").await.unwrap(), Value::Real(18.5));

        let err = sim.write("2:5 binaryOutput 2 presentValue inactive").await.unwrap_err();
        assert!(matches!(err, NetworkError::AccessDenied(_)));
    }

    #[test]
    fn test_fixture_from_toml() {
        let fixture = ControllerFixture::from_toml_str(
            r#"
            name = "VAV-3"
            address = "10.0.0.7"
            device_id = 300

            [[objects]]
            object_type = "analogValue"
            instance = 4
            [objects.properties]
            objectName = "SP"
            presentValue = 22

            [[objects]]
            object_type = 130
            instance = 1

            [[objects]]
            instance = 2
            "#,
        )
        .unwrap();

        assert_eq!(fixture.objects.len(), 3);
        assert_eq!(fixture.services_supported, DEFAULT_SERVICES);
        assert_eq!(fixture.objects[1].object_type, Some(Value::Unsigned(130)));
        assert_eq!(fixture.objects[2].object_type, None);
    }
}
