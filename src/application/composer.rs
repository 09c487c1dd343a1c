// Dashboard composer - Use case for building a whole dashboard
use crate::application::card_binding::CardBinder;
use crate::domain::card::CardSpec;
use crate::domain::dashboard::{
    CardResult, CardStatus, Dashboard, DashboardDefinition, Tab, TabDefinition,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DashboardComposer {
    binder: Arc<CardBinder>,
    definition: Arc<DashboardDefinition>,
}

impl DashboardComposer {
    pub fn new(binder: Arc<CardBinder>, definition: Arc<DashboardDefinition>) -> Self {
        Self { binder, definition }
    }

    /// Render every card of every tab. Never fails: broken cards carry a failed status.
    pub async fn compose(&self) -> Dashboard {
        let mut tabs = Vec::with_capacity(self.definition.tabs.len());
        for tab in &self.definition.tabs {
            tabs.push(self.render_tab(tab).await);
        }

        let dashboard = Dashboard::new(self.definition.title.clone(), tabs);
        let purged = self.binder.purge_cache();
        tracing::info!(
            tabs = dashboard.tabs.len(),
            failed_cards = dashboard.failed_cards(),
            purged,
            "dashboard composed"
        );
        dashboard
    }

    /// Render a single tab, `None` when no tab has this id
    pub async fn compose_tab(&self, tab_id: &str) -> Option<Tab> {
        let tab = self.definition.tab(tab_id)?;
        Some(self.render_tab(tab).await)
    }

    async fn render_tab(&self, tab: &TabDefinition) -> Tab {
        // Cards run concurrently; results are collected in declared order
        let handles: Vec<_> = tab
            .cards
            .iter()
            .map(|card| spawn_card(self.binder.clone(), card.clone()))
            .collect();

        let mut cards = Vec::with_capacity(handles.len());
        for (card, handle) in tab.cards.iter().zip(handles) {
            let status = handle.await.unwrap_or_else(|e| {
                tracing::error!(card = %card.id, "card task aborted: {}", e);
                CardStatus::Failed {
                    reason: "Internal".to_string(),
                    detail: e.to_string(),
                }
            });
            cards.push(CardResult::new(card, status));
        }

        Tab {
            id: tab.id.clone(),
            title: tab.title.clone(),
            cards,
        }
    }
}

pub(crate) fn spawn_card(
    binder: Arc<CardBinder>,
    card: CardSpec,
) -> tokio::task::JoinHandle<CardStatus> {
    tokio::spawn(async move { binder.render(&card).await })
}
