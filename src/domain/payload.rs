// Visualization payloads handed to the external renderer
use super::dataset::Value;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisualizationPayload {
    Heatmap {
        points: Vec<HeatPoint>,
        max_value: f64,
        radius: u32,
        blur: u32,
    },
    Pie {
        slices: Vec<PieSlice>,
    },
    Bar {
        points: Vec<XyPoint>,
    },
    Line {
        points: Vec<XyPoint>,
    },
    Progress {
        items: Vec<ProgressItem>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Text {
        lines: Vec<String>,
    },
    /// Defined empty state: the source produced no rows
    Empty {
        chart: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub share_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XyPoint {
    pub x: Value,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressItem {
    pub label: String,
    pub fraction: f64,
    pub percent_label: String,
}

impl VisualizationPayload {
    pub fn empty(chart: &str) -> Self {
        VisualizationPayload::Empty {
            chart: chart.to_string(),
            message: "No data available".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, VisualizationPayload::Empty { .. })
    }
}

/// `0.4257` -> `"42.6%"`
pub fn percent_label(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_label() {
        assert_eq!(percent_label(0.4257), "42.6%");
        assert_eq!(percent_label(1.0), "100.0%");
        assert_eq!(percent_label(0.0), "0.0%");
    }

    #[test]
    fn test_payload_is_tagged_by_kind() {
        let json = serde_json::to_value(VisualizationPayload::empty("pie")).unwrap();
        assert_eq!(json["kind"], "empty");
        assert_eq!(json["chart"], "pie");
    }
}
