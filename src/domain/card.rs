// Card definitions: one independently-failable unit of the dashboard
use super::error::{DashboardError, DashboardResult};
use super::rules::NormalizationRuleSet;
use super::source::SourceDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    pub id: String,
    pub title: String,
    pub source: SourceDescriptor,
    /// Zero disables caching for this source
    #[serde(default)]
    pub ttl_secs: u64,
    #[serde(default)]
    pub rules: NormalizationRuleSet,
    pub chart: ChartSpec,
    /// Filled in from the card's place in the layout
    #[serde(default)]
    pub layout: CardLayout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLayout {
    pub tab: String,
    pub position: usize,
}

/// Chart kind plus field bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    Heatmap {
        latitude: String,
        longitude: String,
        value: String,
        #[serde(default)]
        max_value: Option<f64>,
        #[serde(default = "default_radius")]
        radius: u32,
        #[serde(default = "default_blur")]
        blur: u32,
    },
    Pie {
        label: String,
        value: String,
    },
    Bar {
        x: String,
        y: String,
        #[serde(default)]
        percent: bool,
    },
    Line {
        x: String,
        y: String,
        #[serde(default)]
        percent: bool,
    },
    /// One bar per column: the `measure_key` row over the `total_key` row
    Progress {
        key_column: String,
        total_key: String,
        measure_key: String,
        columns: Vec<String>,
        #[serde(default)]
        labels: Vec<String>,
    },
    Table {
        #[serde(default)]
        columns: Vec<String>,
    },
    /// One line per row; `${column}` placeholders are substituted
    Text {
        template: String,
    },
}

fn default_radius() -> u32 {
    15
}

fn default_blur() -> u32 {
    10
}

impl ChartSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ChartSpec::Heatmap { .. } => "heatmap",
            ChartSpec::Pie { .. } => "pie",
            ChartSpec::Bar { .. } => "bar",
            ChartSpec::Line { .. } => "line",
            ChartSpec::Progress { .. } => "progress",
            ChartSpec::Table { .. } => "table",
            ChartSpec::Text { .. } => "text",
        }
    }

    fn bound_fields(&self) -> Vec<&str> {
        match self {
            ChartSpec::Heatmap {
                latitude,
                longitude,
                value,
                ..
            } => vec![latitude.as_str(), longitude.as_str(), value.as_str()],
            ChartSpec::Pie { label, value } => vec![label.as_str(), value.as_str()],
            ChartSpec::Bar { x, y, .. } | ChartSpec::Line { x, y, .. } => vec![x.as_str(), y.as_str()],
            ChartSpec::Progress {
                key_column,
                total_key,
                measure_key,
                columns,
                ..
            } => {
                let mut fields = vec![key_column.as_str(), total_key.as_str(), measure_key.as_str()];
                fields.extend(columns.iter().map(String::as_str));
                fields
            }
            ChartSpec::Table { columns } => columns.iter().map(String::as_str).collect(),
            ChartSpec::Text { template } => vec![template.as_str()],
        }
    }

    pub fn validate(&self) -> DashboardResult<()> {
        if self.bound_fields().iter().any(|f| f.trim().is_empty()) {
            return Err(DashboardError::configuration(format!(
                "{} chart has an empty field binding",
                self.kind()
            )));
        }
        if let ChartSpec::Progress {
            columns, labels, ..
        } = self
        {
            if columns.is_empty() {
                return Err(DashboardError::configuration("progress chart needs columns"));
            }
            if !labels.is_empty() && labels.len() != columns.len() {
                return Err(DashboardError::configuration(
                    "progress chart labels must match its columns",
                ));
            }
        }
        Ok(())
    }
}

impl CardSpec {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> DashboardResult<()> {
        if self.id.trim().is_empty() {
            return Err(DashboardError::configuration("card without an id"));
        }
        let context = |e: DashboardError| {
            DashboardError::configuration(format!("card {}: {}", self.id, e.detail()))
        };
        self.source.validate().map_err(context)?;
        self.rules.validate().map_err(context)?;
        self.chart.validate().map_err(context)?;
        Ok(())
    }
}
