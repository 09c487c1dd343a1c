// Dashboard domain model
use super::card::CardSpec;
use super::error::{DashboardError, DashboardResult};
use super::payload::VisualizationPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Static layout declared at startup
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardDefinition {
    pub title: String,
    #[serde(default)]
    pub tabs: Vec<TabDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TabDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cards: Vec<CardSpec>,
}

impl DashboardDefinition {
    /// Stamp each card with its tab and position, then validate the whole layout
    pub fn prepare(mut self) -> DashboardResult<Self> {
        for tab in &mut self.tabs {
            for (position, card) in tab.cards.iter_mut().enumerate() {
                card.layout.tab = tab.id.clone();
                card.layout.position = position;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> DashboardResult<()> {
        let mut tab_ids = HashSet::new();
        let mut card_ids = HashSet::new();
        for tab in &self.tabs {
            if tab.id.trim().is_empty() {
                return Err(DashboardError::configuration("tab without an id"));
            }
            if !tab_ids.insert(tab.id.as_str()) {
                return Err(DashboardError::configuration(format!(
                    "duplicate tab id {:?}",
                    tab.id
                )));
            }
            for card in &tab.cards {
                card.validate()?;
                if !card_ids.insert(card.id.as_str()) {
                    return Err(DashboardError::configuration(format!(
                        "duplicate card id {:?}",
                        card.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn tab(&self, id: &str) -> Option<&TabDefinition> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn cards(&self) -> impl Iterator<Item = &CardSpec> {
        self.tabs.iter().flat_map(|t| t.cards.iter())
    }

    pub fn card_count(&self) -> usize {
        self.tabs.iter().map(|t| t.cards.len()).sum()
    }
}

/// Outcome of rendering one card
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardStatus {
    Ok { payload: VisualizationPayload },
    Failed { reason: String, detail: String },
}

impl CardStatus {
    pub fn failed(error: &DashboardError) -> Self {
        CardStatus::Failed {
            reason: error.code().to_string(),
            detail: error.detail().to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CardStatus::Ok { .. })
    }

    #[cfg(test)]
    pub fn reason(&self) -> Option<&str> {
        match self {
            CardStatus::Failed { reason, .. } => Some(reason),
            CardStatus::Ok { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardResult {
    pub id: String,
    pub title: String,
    pub chart: String,
    pub position: usize,
    #[serde(flatten)]
    pub status: CardStatus,
}

impl CardResult {
    pub fn new(card: &CardSpec, status: CardStatus) -> Self {
        Self {
            id: card.id.clone(),
            title: card.title.clone(),
            chart: card.chart.kind().to_string(),
            position: card.layout.position,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    pub id: String,
    pub title: String,
    pub cards: Vec<CardResult>,
}

#[cfg(test)]
impl Tab {
    pub fn card(&self, id: &str) -> Option<&CardResult> {
        self.cards.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub tabs: Vec<Tab>,
}

impl Dashboard {
    pub fn new(title: String, tabs: Vec<Tab>) -> Self {
        Self {
            title,
            generated_at: Utc::now(),
            tabs,
        }
    }

    #[cfg(test)]
    pub fn card(&self, id: &str) -> Option<&CardResult> {
        self.tabs.iter().find_map(|t| t.card(id))
    }

    pub fn failed_cards(&self) -> usize {
        self.tabs
            .iter()
            .flat_map(|t| t.cards.iter())
            .filter(|c| !c.status.is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::{CardLayout, ChartSpec};
    use crate::domain::rules::NormalizationRuleSet;
    use crate::domain::source::{FileFormat, SourceDescriptor};

    fn card(id: &str) -> CardSpec {
        CardSpec {
            id: id.into(),
            title: id.to_uppercase(),
            source: SourceDescriptor::file(format!("{}.json", id), FileFormat::Records),
            ttl_secs: 0,
            rules: NormalizationRuleSet::default(),
            chart: ChartSpec::Table { columns: vec![] },
            layout: CardLayout::default(),
        }
    }

    fn definition(tabs: Vec<(&str, Vec<CardSpec>)>) -> DashboardDefinition {
        DashboardDefinition {
            title: "Civic".into(),
            tabs: tabs
                .into_iter()
                .map(|(id, cards)| TabDefinition {
                    id: id.into(),
                    title: id.into(),
                    cards,
                })
                .collect(),
        }
    }

    #[test]
    fn test_prepare_stamps_layout() {
        let def = definition(vec![("access", vec![card("a"), card("b")]), ("finance", vec![card("c")])])
            .prepare()
            .unwrap();
        let b = &def.tabs[0].cards[1];
        assert_eq!(b.layout, CardLayout { tab: "access".into(), position: 1 });
        assert_eq!(def.tabs[1].cards[0].layout.tab, "finance");
        assert_eq!(def.card_count(), 3);
    }

    #[test]
    fn test_duplicate_card_ids_are_fatal() {
        let err = definition(vec![("access", vec![card("a")]), ("finance", vec![card("a")])])
            .prepare()
            .unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
    }

    #[test]
    fn test_duplicate_tab_ids_are_fatal() {
        assert!(definition(vec![("access", vec![]), ("access", vec![])]).prepare().is_err());
    }

    #[test]
    fn test_card_status_serialization() {
        let status = CardStatus::failed(&DashboardError::unavailable("no such file"));
        let result = CardResult::new(&card("a"), status);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "SourceUnavailable");
        assert_eq!(json["chart"], "table");
    }
}
