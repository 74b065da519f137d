//! Point discovery
//!
//! Builds the point list of a controller from its object inventory:
//!
//! 1. protocol-services-supported (a missing answer aborts discovery)
//! 2. device name and object list
//! 3. infrastructure objects and non-symbolic types are filtered out
//! 4. each remaining object is classified by its type token
//! 5. one multi-property read per object builds the point
//! 6. the name index is built from the final point list

use super::controller::Controller;
use super::error::{Error, Result};
use super::network::{ObjectId, Value, PRESENT_VALUE};
use super::point::{Point, PointFamily, PointKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name given to a device whose controller did not answer
pub const NOT_FOUND_NAME: &str = "Not Found";

/// Object types that never become points
pub const INFRASTRUCTURE_TYPES: [&str; 10] = [
    "file",
    "calendar",
    "device",
    "schedule",
    "notificationClass",
    "eventLog",
    "trendLog",
    "loop",
    "program",
    "eventEnrollment",
];

/// Discovery options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Fail device construction when the controller does not answer,
    /// instead of producing an empty catalog
    #[serde(default)]
    pub fail_on_unreachable: bool,
}

/// One entry of the controller's object list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    /// Object type as reported (text, number for proprietary types, or null)
    pub object_type: Value,
    /// Object instance
    pub instance: u32,
}

impl InventoryEntry {
    /// Symbolic object type, if any
    pub fn symbolic_type(&self) -> Option<&str> {
        self.object_type.as_text()
    }

    /// Object type to build a point from, or `None` if the entry is skipped
    pub fn point_type(&self) -> Option<&str> {
        self.symbolic_type()
            .filter(|t| !INFRASTRUCTURE_TYPES.contains(t))
    }
}

/// Parse an object-list answer: a list of `[type, instance]` pairs
pub fn parse_inventory(value: Value) -> Result<Vec<InventoryEntry>> {
    let items = match value {
        Value::List(items) => items,
        other => {
            return Err(Error::MalformedResponse(format!("object list is not a list: {}", other)));
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::List(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                let object_type = pair.next().unwrap_or(Value::Null);
                let instance = pair
                    .next()
                    .and_then(|v| v.as_unsigned())
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| Error::MalformedResponse("object list entry without instance".to_string()))?;
                Ok(InventoryEntry { object_type, instance })
            }
            other => Err(Error::MalformedResponse(format!("bad object list entry: {}", other))),
        })
        .collect()
}

/// The points of one controller, in discovery order, with a name index
#[derive(Debug, Default)]
pub struct PointCatalog {
    name: String,
    services_supported: Option<Value>,
    inventory: Vec<InventoryEntry>,
    points: Vec<Arc<Point>>,
    index: BTreeMap<String, Arc<Point>>,
}

impl PointCatalog {
    /// Catalog of a controller that did not answer
    pub fn unreachable() -> Self {
        Self {
            name: NOT_FOUND_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Discover the points of a controller
    pub async fn discover(controller: &Arc<Controller>, config: &DiscoveryConfig) -> Result<Self> {
        let device = controller.device_object();

        let services = match controller.read_property(&device, "protocolServicesSupported").await {
            Ok(services) => services,
            Err(Error::Unreachable(reason)) => {
                warn!(
                    "Controller {} not found, aborting discovery ({})",
                    controller.address(),
                    reason
                );
                if config.fail_on_unreachable {
                    return Err(Error::Unreachable(reason));
                }
                return Ok(Self::unreachable());
            }
            Err(e) => return Err(e),
        };

        let name = controller.read_property(&device, "objectName").await?.to_text();
        info!("Found {}... building points list", name);

        let inventory = parse_inventory(controller.read_property(&device, "objectList").await?)?;

        let mut points = Vec::new();
        for entry in &inventory {
            let Some(object_type) = entry.point_type() else {
                debug!("Skipping {:?} {}", entry.object_type, entry.instance);
                continue;
            };
            let object = ObjectId::new(object_type, entry.instance);
            let family = PointFamily::classify(object_type);
            points.push(Arc::new(Self::read_point(controller, object, family).await?));
        }

        let catalog = Self::from_parts(name, Some(services), inventory, points);
        info!("Ready! {} points on {}", catalog.len(), catalog.name);
        Ok(catalog)
    }

    /// Build a point with one multi-property read
    async fn read_point(controller: &Arc<Controller>, object: ObjectId, family: PointFamily) -> Result<Point> {
        let mut properties = vec!["objectName", "description", PRESENT_VALUE];
        properties.extend_from_slice(family.metadata_properties());

        let values = controller.read_properties(&object, &properties).await?;
        if values.len() < properties.len() {
            return Err(Error::MalformedResponse(format!(
                "{}: expected {} values, got {}",
                object,
                properties.len(),
                values.len()
            )));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or(Value::Null);

        let name = next().to_text();
        let description = match next() {
            Value::Null => String::new(),
            other => other.to_text(),
        };
        let present_value = next();
        let kind = match family {
            PointFamily::Numeric => PointKind::Numeric { units: next().to_text() },
            PointFamily::Boolean => PointKind::Boolean {
                inactive_text: next().to_text(),
                active_text: next().to_text(),
            },
            PointFamily::Enum => PointKind::Enum {
                states: next()
                    .as_list()
                    .map(|states| states.iter().map(Value::to_text).collect())
                    .unwrap_or_default(),
            },
        };

        debug!("Discovered {} ({}) as {}", name, object, family);
        Ok(Point::new(
            object,
            name,
            description,
            kind,
            present_value,
            Arc::downgrade(controller),
        ))
    }

    /// Assemble a catalog. The first point registered under a name wins;
    /// later points with the same name are left out.
    fn from_parts(
        name: String,
        services_supported: Option<Value>,
        inventory: Vec<InventoryEntry>,
        candidates: Vec<Arc<Point>>,
    ) -> Self {
        let mut points = Vec::with_capacity(candidates.len());
        let mut index: BTreeMap<String, Arc<Point>> = BTreeMap::new();

        for point in candidates {
            if let Some(existing) = index.get(point.name()) {
                warn!(
                    "Duplicate point name {}: keeping {}, ignoring {}",
                    point.name(),
                    existing.object(),
                    point.object()
                );
                continue;
            }
            index.insert(point.name().to_string(), point.clone());
            points.push(point);
        }

        Self {
            name,
            services_supported,
            inventory,
            points,
            index,
        }
    }

    /// Device name (or [`NOT_FOUND_NAME`])
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol-services-supported answer, if the controller was reached
    pub fn services_supported(&self) -> Option<&Value> {
        self.services_supported.as_ref()
    }

    /// Raw object list, unfiltered
    pub fn inventory(&self) -> &[InventoryEntry] {
        &self.inventory
    }

    /// Points in discovery order
    pub fn points(&self) -> &[Arc<Point>] {
        &self.points
    }

    /// Iterate points in discovery order
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Point>> {
        self.points.iter()
    }

    /// Point names in discovery order
    pub fn names(&self) -> Vec<String> {
        self.points.iter().map(|p| p.name().to_string()).collect()
    }

    /// Look up a point by exact name
    pub fn get(&self, name: &str) -> Option<&Arc<Point>> {
        self.index.get(name)
    }

    /// Look up a point by exact name, failing with [`Error::NotFound`]
    pub fn resolve(&self, name: &str) -> Result<&Arc<Point>> {
        self.get(name).ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if no point was discovered
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points currently flagged as simulated, in discovery order
    pub fn simulated(&self) -> impl Iterator<Item = &Arc<Point>> + '_ {
        self.points.iter().filter(|p| p.is_simulated())
    }
}
