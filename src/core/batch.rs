//! Batched reads
//!
//! Reading points one at a time costs one round trip per point. The batcher
//! groups point names into chunks and issues one multi-property read per
//! chunk. Chunks are kept small enough that requests do not need
//! segmentation on most controllers.
//!
//! Every chunk is its own unit of atomicity: a chunk that cannot be resolved
//! or read applies no update, chunks already read keep theirs.

use super::catalog::PointCatalog;
use super::controller::Controller;
use super::error::{Error, Result};
use super::point::Point;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of points per request
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Result from a batched read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of requests issued
    pub chunks: usize,
    /// Points per request, in request order
    pub chunk_sizes: Vec<usize>,
    /// Points whose history received a new sample
    pub points_updated: usize,
    /// Total execution time
    pub total_duration: Duration,
}

impl BatchReport {
    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} points updated in {} requests, took {:?}",
            self.points_updated, self.chunks, self.total_duration
        )
    }
}

/// Build the multi-read request for a chunk of points:
/// `<address> <type> <instance> presentValue <type> <instance> presentValue ...`
pub fn build_request(address: &str, points: &[Arc<Point>]) -> String {
    let mut request = String::from(address);
    for point in points {
        request.push(' ');
        request.push_str(&point.present_value_request());
    }
    request
}

/// Batched reader over a device's catalog
pub struct ReadBatcher<'a> {
    controller: &'a Controller,
    catalog: &'a PointCatalog,
    batch_size: usize,
}

impl<'a> ReadBatcher<'a> {
    /// Create a batcher with the default batch size
    pub fn new(controller: &'a Controller, catalog: &'a PointCatalog) -> Self {
        Self {
            controller,
            catalog,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set points per request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Points per request
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolve every name of a chunk without reading anything
    pub fn resolve_chunk<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<Point>>> {
        names
            .iter()
            .map(|name| self.catalog.resolve(name.as_ref()).cloned())
            .collect()
    }

    /// Read the present value of every named point and append it to the
    /// point's history. Names are read in the given order.
    pub async fn read_multiple<S: AsRef<str>>(&self, names: &[S]) -> Result<BatchReport> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".to_string()));
        }

        let start = Instant::now();
        let mut report = BatchReport::default();

        for chunk in names.chunks(self.batch_size) {
            let points = self.resolve_chunk(chunk)?;
            let request = build_request(self.controller.address(), &points);
            debug!("Reading {} points from {}", points.len(), self.controller.address());

            let values = self.controller.read_multiple(&request).await?;
            if values.len() != points.len() {
                return Err(Error::MalformedResponse(format!(
                    "expected {} values, got {}",
                    points.len(),
                    values.len()
                )));
            }

            for (point, value) in points.iter().zip(values) {
                point.trend(value);
            }

            report.chunks += 1;
            report.chunk_sizes.push(points.len());
            report.points_updated += points.len();
        }

        report.total_duration = start.elapsed();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::DiscoveryConfig;
    use crate::core::network::{ControllerFixture, Network, ObjectFixture, SimulatedController, Value};

    async fn setup(count: u32) -> (Arc<SimulatedController>, Arc<Controller>, PointCatalog) {
        let mut fixture = ControllerFixture::new("AHU-1", "2:5", 5);
        for i in 1..=count {
            fixture = fixture.with_object(ObjectFixture::numeric(
                "analogInput",
                i,
                &format!("AI-{}", i),
                f64::from(i),
                "percent",
            ));
        }
        let sim = Arc::new(SimulatedController::new(fixture));
        let network: Arc<dyn Network> = sim.clone();
        let controller = Arc::new(Controller::new("2:5", 5, network));
        let catalog = PointCatalog::discover(&controller, &DiscoveryConfig::default())
            .await
            .unwrap();
        sim.clear_requests();
        (sim, controller, catalog)
    }

    #[tokio::test]
    async fn test_chunking_preserves_order() {
        let (sim, controller, catalog) = setup(5).await;
        let names = catalog.names();

        let report = ReadBatcher::new(&controller, &catalog)
            .with_batch_size(2)
            .read_multiple(&names)
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.chunk_sizes, vec![2, 2, 1]);
        assert_eq!(report.points_updated, 5);

        let requests = sim.multi_read_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0],
            "2:5 analogInput 1 presentValue analogInput 2 presentValue"
        );
        assert_eq!(requests[2], "2:5 analogInput 5 presentValue");

        for (i, point) in catalog.iter().enumerate() {
            let sample = point.last_sample().unwrap();
            assert_eq!(sample.value, Value::Real((i + 1) as f64));
        }
    }

    #[tokio::test]
    async fn test_unknown_name_voids_chunk() {
        let (sim, controller, catalog) = setup(4).await;
        let names = ["AI-1", "AI-2", "AI-3", "NOPE", "AI-4"];

        let err = ReadBatcher::new(&controller, &catalog)
            .with_batch_size(2)
            .read_multiple(&names)
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotFound("NOPE".to_string()));

        // First chunk went through, second chunk was never sent
        assert_eq!(sim.multi_read_requests().len(), 1);
        assert_eq!(catalog.get("AI-1").unwrap().history_len(), 1);
        assert_eq!(catalog.get("AI-2").unwrap().history_len(), 1);
        assert_eq!(catalog.get("AI-3").unwrap().history_len(), 0);
        assert_eq!(catalog.get("AI-4").unwrap().history_len(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let (_sim, controller, catalog) = setup(1).await;
        let err = ReadBatcher::new(&controller, &catalog)
            .with_batch_size(0)
            .read_multiple(&["AI-1"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_empty_names_issue_no_request() {
        let (sim, controller, catalog) = setup(2).await;
        let names: Vec<String> = Vec::new();
        let report = ReadBatcher::new(&controller, &catalog)
            .read_multiple(&names)
            .await
            .unwrap();
        assert_eq!(report.chunks, 0);
        assert!(sim.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_chunk_applies_nothing() {
        let (sim, controller, catalog) = setup(3).await;
        sim.set_reachable(false);

        let err = ReadBatcher::new(&controller, &catalog)
            .read_multiple(&catalog.names())
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
        assert!(catalog.iter().all(|p| p.history_len() == 0));
    }
}
