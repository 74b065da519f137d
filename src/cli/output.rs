//! Output rendering for CLI commands
//!
//! Text for people, JSON and CSV for scripts. Everything is rendered to a
//! `String` so commands stay testable; the binary decides where it goes.

use crate::core::batch::BatchReport;
use crate::core::device::Device;
use crate::core::point::Point;
use crate::core::poll::PollStats;
use clap::ValueEnum;
use serde::Serialize;
use std::sync::Arc;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
    /// CSV format
    Csv,
}

/// One row of point output
#[derive(Debug, Clone, Serialize)]
pub struct PointRow {
    /// Point name
    pub name: String,
    /// Object type token
    pub object_type: String,
    /// Object instance
    pub instance: u32,
    /// Point family
    pub family: String,
    /// Description
    pub description: String,
    /// Cached value, with its state text for binary and multi-state points
    pub value: String,
    /// Units or state texts
    pub units: String,
    /// Latest trend sample, if any
    pub last_sample: Option<String>,
    /// Number of trend samples
    pub history: usize,
    /// Simulated flag
    pub simulated: bool,
}

impl From<&Point> for PointRow {
    fn from(point: &Point) -> Self {
        let value = point.value();
        let shown = match point.state_label(&value) {
            Some(label) => format!("{} ({})", label, value.to_text()),
            None => value.to_text(),
        };
        Self {
            name: point.name().to_string(),
            object_type: point.object_type().to_string(),
            instance: point.instance(),
            family: point.family().to_string(),
            description: point.description().to_string(),
            value: shown,
            units: point.kind().units_or_states(),
            last_sample: point.last_sample().map(|s| s.value.to_text()),
            history: point.history_len(),
            simulated: point.is_simulated(),
        }
    }
}

const CSV_HEADER: [&str; 10] = [
    "name",
    "object_type",
    "instance",
    "family",
    "description",
    "value",
    "units",
    "last_sample",
    "history",
    "simulated",
];

/// Render a header line followed by one record per row
fn to_csv<R: Serialize>(header: &[&str], rows: impl IntoIterator<Item = R>) -> csv::Result<String> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
}

/// Render a list of points
pub fn format_points(points: &[Arc<Point>], format: OutputFormat) -> String {
    let rows: Vec<PointRow> = points.iter().map(|p| PointRow::from(&**p)).collect();
    match format {
        OutputFormat::Text => points
            .iter()
            .map(|p| {
                let mut line = format!("{:<8} {:<22} {}", p.family(), p.object().to_string(), p);
                if let Some(sample) = p.last_sample() {
                    line.push_str(&format!("  [trend {} @ {}]", sample.value, sample.timestamp.format("%H:%M:%S")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(&rows).unwrap_or_default(),
        OutputFormat::Csv => to_csv(&CSV_HEADER, &rows).unwrap_or_default(),
    }
}

fn duration_ms(report: &BatchReport) -> u64 {
    u64::try_from(report.total_duration.as_millis()).unwrap_or(u64::MAX)
}

/// Render the outcome of a batched read
pub fn format_report(report: &BatchReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => report.summary(),
        OutputFormat::Json => serde_json::json!({
            "chunks": report.chunks,
            "chunk_sizes": report.chunk_sizes,
            "points_updated": report.points_updated,
            "duration_ms": duration_ms(report),
        })
        .to_string(),
        OutputFormat::Csv => to_csv(
            &["chunks", "points_updated", "duration_ms"],
            [(report.chunks, report.points_updated, duration_ms(report))],
        )
        .unwrap_or_default(),
    }
}

/// Render poller statistics
pub fn format_poll_stats(stats: &PollStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "{} cycles started, {} completed, {} failed, {} ticks skipped",
            stats.cycles_started, stats.cycles_completed, stats.cycles_failed, stats.ticks_skipped
        ),
        OutputFormat::Json => serde_json::to_string(stats).unwrap_or_default(),
        OutputFormat::Csv => to_csv(
            &[
                "cycles_started",
                "cycles_completed",
                "cycles_failed",
                "ticks_skipped",
                "tasks_spawned",
                "live_tasks",
            ],
            [stats],
        )
        .unwrap_or_default(),
    }
}

/// Render a device summary
pub fn format_device(device: &Device, format: OutputFormat) -> String {
    let catalog = device.catalog();
    let services = catalog.services_supported().map(|v| v.to_text()).unwrap_or_default();
    match format {
        OutputFormat::Text => format!(
            "Device:    {}\nAddress:   {}\nInstance:  {}\nServices:  {}\nObjects:   {}\nPoints:    {}\nSimulated: {}",
            device,
            device.address(),
            device.device_id(),
            services,
            catalog.inventory().len(),
            device.len(),
            device.simulated_points().count()
        ),
        OutputFormat::Json => serde_json::json!({
            "name": device.name(),
            "address": device.address(),
            "device_id": device.device_id(),
            "services_supported": services,
            "objects": catalog.inventory().len(),
            "points": device.len(),
            "simulated": device.simulated_points().count(),
        })
        .to_string(),
        OutputFormat::Csv => to_csv(
            &["name", "address", "device_id", "objects", "points"],
            [(
                device.name(),
                device.address(),
                device.device_id(),
                catalog.inventory().len(),
                device.len(),
            )],
        )
        .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::{ControllerFixture, ObjectFixture, SimulatedController};

    async fn device() -> Device {
        let fixture = ControllerFixture::new("AHU-1", "2:5", 5)
            .with_object(ObjectFixture::numeric("analogInput", 1, "SAT", 13.5, "degreesCelsius"))
            .with_object(
                ObjectFixture::binary("binaryOutput", 1, "FAN", true).property("description", "Supply fan, main"),
            );
        Device::connect("2:5", 5, Arc::new(SimulatedController::new(fixture)))
            .await
            .unwrap()
    }

    #[test]
    fn test_csv_quoting() {
        let out = to_csv(
            &["a", "b", "c", "d"],
            [("plain", "a,b", "say \"hi\"", "line\rbreak")],
        )
        .unwrap();
        assert_eq!(out, "a,b,c,d\nplain,\"a,b\",\"say \"\"hi\"\"\",\"line\rbreak\"");

        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[3], "line\rbreak");
    }

    #[tokio::test]
    async fn test_point_formats() {
        let device = device().await;
        let points = device.catalog().points();

        let text = format_points(points, OutputFormat::Text);
        assert!(text.contains("SAT : 13.5 degreesCelsius"));
        assert!(text.contains("FAN : On"));

        let json: serde_json::Value = serde_json::from_str(&format_points(points, OutputFormat::Json)).unwrap();
        assert_eq!(json[0]["name"], "SAT");
        assert_eq!(json[1]["family"], "Boolean");

        let csv = format_points(points, OutputFormat::Csv);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert!(lines[2].contains("\"Supply fan, main\""));

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][0], "SAT");
        assert_eq!(&rows[1][4], "Supply fan, main");
        assert_eq!(&rows[1][9], "false");
    }

    #[tokio::test]
    async fn test_device_summary() {
        let device = device().await;
        let json: serde_json::Value = serde_json::from_str(&format_device(&device, OutputFormat::Json)).unwrap();
        assert_eq!(json["name"], "AHU-1");
        assert_eq!(json["points"], 2);
        assert!(format_device(&device, OutputFormat::Text).contains("Points:    2"));
    }
}
