// Card binding - Use case for turning one card spec into a payload
use crate::application::cache_layer::CacheLayer;
use crate::application::normalizer::normalize;
use crate::application::source_adapter::SourceAdapter;
use crate::domain::card::{CardSpec, ChartSpec};
use crate::domain::dashboard::CardStatus;
use crate::domain::dataset::{NormalizedDataset, Value};
use crate::domain::error::{DashboardError, DashboardResult};
use crate::domain::payload::{
    HeatPoint, PieSlice, ProgressItem, VisualizationPayload, XyPoint, percent_label,
};
use crate::domain::rules::{PercentScale, sanitize_column_name};
use crate::domain::source::SourceDescriptor;
use crate::domain::table::Scalar;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct CardBinder {
    adapter: Arc<dyn SourceAdapter>,
    cache: Arc<CacheLayer>,
    fetch_timeout: Duration,
}

impl CardBinder {
    pub fn new(adapter: Arc<dyn SourceAdapter>, cache: Arc<CacheLayer>, fetch_timeout: Duration) -> Self {
        Self {
            adapter,
            cache,
            fetch_timeout,
        }
    }

    /// Render one card; every error stops here and becomes a failed status
    pub async fn render(&self, card: &CardSpec) -> CardStatus {
        match self.try_render(card).await {
            Ok(payload) => CardStatus::Ok { payload },
            Err(e) => {
                tracing::warn!(card = %card.id, reason = e.code(), "card unavailable: {}", e);
                CardStatus::failed(&e)
            }
        }
    }

    async fn try_render(&self, card: &CardSpec) -> DashboardResult<VisualizationPayload> {
        let dataset = self.dataset(card).await?;
        shape(&card.chart, &dataset, card.rules.percent_scale)
    }

    /// Evict expired cache entries, returning how many were dropped
    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Cached fetch followed by normalization.
    ///
    /// The timeout covers the wait for another caller's in-flight load as
    /// well as the adapter call itself.
    pub async fn dataset(&self, card: &CardSpec) -> DashboardResult<NormalizedDataset> {
        let lookup = self
            .cache
            .get(&card.source, card.ttl(), || self.adapter.fetch(&card.source));
        let raw = match tokio::time::timeout(self.fetch_timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out(&card.source, self.fetch_timeout)),
        };
        normalize(&raw, &card.rules)
    }
}

fn timed_out(descriptor: &SourceDescriptor, timeout: Duration) -> DashboardError {
    DashboardError::unavailable(format!(
        "{} source timed out after {}s",
        descriptor.kind(),
        timeout.as_secs_f64()
    ))
}

/// Presentation shaping; an empty dataset always yields the empty payload
pub fn shape(
    chart: &ChartSpec,
    dataset: &NormalizedDataset,
    scale: PercentScale,
) -> DashboardResult<VisualizationPayload> {
    if dataset.is_empty() {
        return Ok(VisualizationPayload::empty(chart.kind()));
    }

    let payload = match chart {
        ChartSpec::Heatmap {
            latitude,
            longitude,
            value,
            max_value,
            radius,
            blur,
        } => {
            let (lat, lon, val) = (
                column(dataset, latitude)?,
                column(dataset, longitude)?,
                column(dataset, value)?,
            );
            let points: Vec<HeatPoint> = dataset
                .rows
                .iter()
                .filter_map(|row| {
                    Some(HeatPoint {
                        lat: row[lat].as_f64()?,
                        lon: row[lon].as_f64()?,
                        value: row[val].as_f64()?,
                    })
                })
                .collect();
            let max_value = max_value.unwrap_or_else(|| {
                points.iter().map(|p| p.value).fold(0.0, f64::max)
            });
            VisualizationPayload::Heatmap {
                points,
                max_value,
                radius: *radius,
                blur: *blur,
            }
        }
        ChartSpec::Pie { label, value } => {
            let (label, value) = (column(dataset, label)?, column(dataset, value)?);
            let pairs: Vec<(String, f64)> = dataset
                .rows
                .iter()
                .filter_map(|row| Some((row[label].to_string(), row[value].as_f64()?)))
                .collect();
            let total: f64 = pairs.iter().map(|(_, v)| v).sum();
            let slices = pairs
                .into_iter()
                .map(|(label, value)| {
                    let share = if total > 0.0 { value / total } else { 0.0 };
                    PieSlice {
                        label,
                        value,
                        share_label: percent_label(share),
                    }
                })
                .collect();
            VisualizationPayload::Pie { slices }
        }
        ChartSpec::Bar { x, y, percent } => VisualizationPayload::Bar {
            points: xy_points(dataset, x, y, *percent, scale)?,
        },
        ChartSpec::Line { x, y, percent } => VisualizationPayload::Line {
            points: xy_points(dataset, x, y, *percent, scale)?,
        },
        ChartSpec::Progress {
            key_column,
            total_key,
            measure_key,
            columns,
            labels,
        } => {
            let key = column(dataset, key_column)?;
            let total_row = keyed_row(dataset, key, total_key)?;
            let measure_row = keyed_row(dataset, key, measure_key)?;

            let items = columns
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let index = column(dataset, name)?;
                    let total = numeric_cell(&total_row[index], name, total_key)?;
                    let measure = numeric_cell(&measure_row[index], name, measure_key)?;
                    let fraction = if total > 0.0 {
                        (measure / total).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    Ok(ProgressItem {
                        label: labels
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| name.replace('_', " ")),
                        fraction,
                        percent_label: percent_label(fraction),
                    })
                })
                .collect::<DashboardResult<Vec<_>>>()?;
            VisualizationPayload::Progress { items }
        }
        ChartSpec::Table { columns } => {
            let picks = if columns.is_empty() {
                (0..dataset.columns.len()).collect()
            } else {
                columns
                    .iter()
                    .map(|name| column(dataset, name))
                    .collect::<DashboardResult<Vec<_>>>()?
            };
            VisualizationPayload::Table {
                columns: picks.iter().map(|&i| dataset.columns[i].name.clone()).collect(),
                rows: dataset
                    .rows
                    .iter()
                    .map(|row| picks.iter().map(|&i| row[i].clone()).collect())
                    .collect(),
            }
        }
        ChartSpec::Text { template } => VisualizationPayload::Text {
            lines: dataset
                .rows
                .iter()
                .map(|row| fill_template(template, dataset, row))
                .collect(),
        },
    };
    Ok(payload)
}

fn column(dataset: &NormalizedDataset, name: &str) -> DashboardResult<usize> {
    let wanted = sanitize_column_name(name);
    dataset.column_index(&wanted).ok_or_else(|| {
        DashboardError::malformed(format!("chart field {:?} is not a dataset column", wanted))
    })
}

fn keyed_row<'a>(dataset: &'a NormalizedDataset, key: usize, wanted: &str) -> DashboardResult<&'a [Value]> {
    let target = Scalar::text(wanted);
    dataset
        .rows
        .iter()
        .find(|row| row[key].matches(&target))
        .map(Vec::as_slice)
        .ok_or_else(|| DashboardError::malformed(format!("no row keyed {:?}", wanted)))
}

fn numeric_cell(value: &Value, column: &str, row: &str) -> DashboardResult<f64> {
    value.as_f64().ok_or_else(|| {
        DashboardError::malformed(format!("{:?} / {:?} is not numeric: {:?}", row, column, value))
    })
}

fn xy_points(
    dataset: &NormalizedDataset,
    x: &str,
    y: &str,
    percent: bool,
    scale: PercentScale,
) -> DashboardResult<Vec<XyPoint>> {
    let (x, y) = (column(dataset, x)?, column(dataset, y)?);
    Ok(dataset
        .rows
        .iter()
        .filter_map(|row| {
            let value = row[y].as_f64()?;
            let label = percent.then(|| match scale {
                PercentScale::Fraction => percent_label(value),
                PercentScale::Points => format!("{:.1}%", value),
            });
            Some(XyPoint {
                x: row[x].clone(),
                y: value,
                label,
            })
        })
        .collect())
}

/// Substitute `${column}` placeholders with the row's values
fn fill_template(template: &str, dataset: &NormalizedDataset, row: &[Value]) -> String {
    let mut line = template.to_string();
    for (schema, value) in dataset.columns.iter().zip(row) {
        let placeholder = format!("${{{}}}", schema.name);
        line = line.replace(&placeholder, &value.to_string());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::source_adapter::test_support::StubAdapter;
    use crate::domain::card::CardLayout;
    use crate::domain::dataset::{ColumnSchema, SemanticType};
    use crate::domain::rules::{ColumnRule, NormalizationRuleSet};
    use crate::domain::source::FileFormat;
    use crate::domain::table::RawTable;

    fn card(id: &str, chart: ChartSpec, rules: NormalizationRuleSet) -> CardSpec {
        CardSpec {
            id: id.into(),
            title: id.into(),
            source: SourceDescriptor::file(format!("data/{}.csv", id), FileFormat::Records),
            ttl_secs: 60,
            rules,
            chart,
            layout: CardLayout::default(),
        }
    }

    fn binder(adapter: Arc<StubAdapter>) -> CardBinder {
        CardBinder::new(adapter, Arc::new(CacheLayer::new()), Duration::from_secs(5))
    }

    fn heatmap_card() -> CardSpec {
        card(
            "coverage",
            ChartSpec::Heatmap {
                latitude: "Latitude".into(),
                longitude: "Longitude".into(),
                value: "BroadbandCoverage".into(),
                max_value: Some(100.0),
                radius: 15,
                blur: 10,
            },
            NormalizationRuleSet {
                columns: vec![
                    ColumnRule { name: "Latitude".into(), semantic: SemanticType::Coordinate },
                    ColumnRule { name: "Longitude".into(), semantic: SemanticType::Coordinate },
                    ColumnRule { name: "BroadbandCoverage".into(), semantic: SemanticType::Percentage },
                ],
                geospatial: true,
                ..Default::default()
            },
        )
    }

    fn coverage_table() -> RawTable {
        RawTable::new(
            vec!["City".into(), "Latitude".into(), "Longitude".into(), "BroadbandCoverage".into()],
            vec![
                vec!["Hilo".into(), "19.7".into(), "-155.1".into(), "91%".into()],
                vec!["Unknown".into(), Scalar::Null, Scalar::Null, "50%".into()],
            ],
        )
    }

    fn dataset(columns: &[(&str, SemanticType)], rows: Vec<Vec<Value>>) -> NormalizedDataset {
        NormalizedDataset {
            columns: columns
                .iter()
                .map(|(name, semantic)| ColumnSchema { name: name.to_string(), semantic: *semantic })
                .collect(),
            rows,
            skipped: vec![],
        }
    }

    #[tokio::test]
    async fn test_render_heatmap() {
        let adapter = Arc::new(StubAdapter::new());
        let card = heatmap_card();
        adapter.set(&card.source, Ok(coverage_table()));

        let status = binder(adapter).render(&card).await;
        assert_eq!(
            status,
            CardStatus::Ok {
                payload: VisualizationPayload::Heatmap {
                    points: vec![HeatPoint { lat: 19.7, lon: -155.1, value: 91.0 }],
                    max_value: 100.0,
                    radius: 15,
                    blur: 10,
                }
            }
        );
    }

    #[tokio::test]
    async fn test_source_failure_becomes_failed_status() {
        let adapter = Arc::new(StubAdapter::new());
        let card = heatmap_card();
        adapter.set(&card.source, Err(DashboardError::unavailable("No such file")));

        let status = binder(adapter).render(&card).await;
        assert_eq!(status.reason(), Some("SourceUnavailable"));
    }

    #[tokio::test]
    async fn test_missing_field_is_malformed() {
        let adapter = Arc::new(StubAdapter::new());
        let mut card = heatmap_card();
        card.chart = ChartSpec::Pie { label: "City".into(), value: "Households".into() };
        adapter.set(&card.source, Ok(coverage_table()));

        let status = binder(adapter).render(&card).await;
        assert_eq!(status.reason(), Some("SourceMalformed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let adapter = Arc::new(StubAdapter::with_delay(Duration::from_secs(30)));
        let card = heatmap_card();
        adapter.set(&card.source, Ok(coverage_table()));

        let status = binder(adapter).render(&card).await;
        assert_eq!(status.reason(), Some("SourceUnavailable"));
    }

    #[tokio::test]
    async fn test_empty_dataset_renders_empty_state() {
        let adapter = Arc::new(StubAdapter::new());
        let card = heatmap_card();
        adapter.set(
            &card.source,
            Ok(RawTable::new(coverage_table().columns, vec![])),
        );

        let status = binder(adapter).render(&card).await;
        assert_eq!(
            status,
            CardStatus::Ok {
                payload: VisualizationPayload::empty("heatmap")
            }
        );
    }

    #[tokio::test]
    async fn test_dataset_uses_cache() {
        let adapter = Arc::new(StubAdapter::new());
        let card = heatmap_card();
        adapter.set(&card.source, Ok(coverage_table()));
        let binder = binder(adapter.clone());

        binder.render(&card).await;
        binder.render(&card).await;
        assert_eq!(adapter.calls(&card.source), 1);
    }

    #[test]
    fn test_pie_share_labels() {
        let data = dataset(
            &[("County", SemanticType::String), ("Population", SemanticType::Number)],
            vec![
                vec![Value::Text("Honolulu".into()), Value::Number(3.0)],
                vec![Value::Text("Maui".into()), Value::Number(1.0)],
            ],
        );
        let chart = ChartSpec::Pie { label: "County".into(), value: "Population".into() };
        let payload = shape(&chart, &data, PercentScale::Points).unwrap();
        let VisualizationPayload::Pie { slices } = payload else {
            panic!("expected pie payload");
        };
        assert_eq!(slices[0].share_label, "75.0%");
        assert_eq!(slices[1].share_label, "25.0%");
    }

    #[test]
    fn test_progress_ratios() {
        let data = dataset(
            &[
                ("Measure", SemanticType::String),
                ("Maui_County_Total", SemanticType::Number),
                ("Kauai_County_Total", SemanticType::Number),
            ],
            vec![
                vec![Value::Text("Total households".into()), Value::Number(200.0), Value::Number(0.0)],
                vec![Value::Text("With a computer".into()), Value::Number(150.0), Value::Number(5.0)],
            ],
        );
        let chart = ChartSpec::Progress {
            key_column: "Measure".into(),
            total_key: "Total households".into(),
            measure_key: "With a computer".into(),
            columns: vec!["Maui_County_Total".into(), "Kauai_County_Total".into()],
            labels: vec![],
        };
        let payload = shape(&chart, &data, PercentScale::Points).unwrap();
        assert_eq!(
            payload,
            VisualizationPayload::Progress {
                items: vec![
                    ProgressItem {
                        label: "Maui County Total".into(),
                        fraction: 0.75,
                        percent_label: "75.0%".into(),
                    },
                    ProgressItem {
                        label: "Kauai County Total".into(),
                        fraction: 0.0,
                        percent_label: "0.0%".into(),
                    },
                ]
            }
        );

        let missing = ChartSpec::Progress {
            key_column: "Measure".into(),
            total_key: "Total households".into(),
            measure_key: "With broadband".into(),
            columns: vec!["Maui_County_Total".into()],
            labels: vec![],
        };
        assert_eq!(
            shape(&missing, &data, PercentScale::Points).unwrap_err().code(),
            "SourceMalformed"
        );
    }

    #[test]
    fn test_bar_percent_labels_follow_scale() {
        let data = dataset(
            &[("Survey", SemanticType::String), ("Share", SemanticType::Percentage)],
            vec![vec![Value::Text("Can use email".into()), Value::Number(0.425)]],
        );
        let chart = ChartSpec::Bar { x: "Survey".into(), y: "Share".into(), percent: true };
        let VisualizationPayload::Bar { points } = shape(&chart, &data, PercentScale::Fraction).unwrap() else {
            panic!("expected bar payload");
        };
        assert_eq!(points[0].label.as_deref(), Some("42.5%"));
    }

    #[test]
    fn test_text_template() {
        let data = dataset(
            &[("County", SemanticType::String), ("Population", SemanticType::Number)],
            vec![vec![Value::Text("Kauai".into()), Value::Number(73298.0)]],
        );
        let chart = ChartSpec::Text {
            template: "${County} has a population of ${Population}".into(),
        };
        assert_eq!(
            shape(&chart, &data, PercentScale::Points).unwrap(),
            VisualizationPayload::Text {
                lines: vec!["Kauai has a population of 73298".into()]
            }
        );
    }

    #[test]
    fn test_table_projection() {
        let data = dataset(
            &[("County", SemanticType::String), ("Population", SemanticType::Number)],
            vec![vec![Value::Text("Kauai".into()), Value::Number(1.0)]],
        );
        let chart = ChartSpec::Table { columns: vec!["Population".into()] };
        assert_eq!(
            shape(&chart, &data, PercentScale::Points).unwrap(),
            VisualizationPayload::Table {
                columns: vec!["Population".into()],
                rows: vec![vec![Value::Number(1.0)]],
            }
        );
    }
}
