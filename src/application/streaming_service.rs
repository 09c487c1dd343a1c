// Streaming dashboard service - Progressive loading, one message per finished card
use crate::application::card_binding::CardBinder;
use crate::application::composer::spawn_card;
use crate::domain::dashboard::{CardResult, CardStatus, DashboardDefinition};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Skeleton(DashboardSkeleton),
    Card { tab: String, card: CardResult },
    Complete(CompletionEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSkeleton {
    pub title: String,
    pub tabs: Vec<TabSkeleton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabSkeleton {
    pub id: String,
    pub title: String,
    pub cards: Vec<CardSkeleton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSkeleton {
    pub id: String,
    pub title: String,
    pub chart: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvent {
    pub total_cards: usize,
    pub failed_cards: usize,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct StreamingDashboardService {
    binder: Arc<CardBinder>,
    definition: Arc<DashboardDefinition>,
}

impl StreamingDashboardService {
    pub fn new(binder: Arc<CardBinder>, definition: Arc<DashboardDefinition>) -> Self {
        Self { binder, definition }
    }

    /// Skeleton first, then cards in completion order, then a completion event
    pub fn stream_dashboard(&self) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(100);
        let start_time = Instant::now();
        let definition = self.definition.clone();
        let binder = self.binder.clone();

        tokio::spawn(async move {
            let skeleton = build_skeleton(&definition);
            if tx.send(StreamMessage::Skeleton(skeleton)).await.is_err() {
                return;
            }

            let mut tasks = JoinSet::new();
            for tab in &definition.tabs {
                for card in &tab.cards {
                    let handle = spawn_card(binder.clone(), card.clone());
                    let (tab_id, card) = (tab.id.clone(), card.clone());
                    tasks.spawn(async move {
                        let status = handle.await.unwrap_or_else(|e| CardStatus::Failed {
                            reason: "Internal".to_string(),
                            detail: e.to_string(),
                        });
                        (tab_id, CardResult::new(&card, status))
                    });
                }
            }

            let mut total_cards = 0;
            let mut failed_cards = 0;
            while let Some(joined) = tasks.join_next().await {
                let Ok((tab, card)) = joined else {
                    continue;
                };
                total_cards += 1;
                if !card.status.is_ok() {
                    failed_cards += 1;
                }
                // Client went away
                if tx.send(StreamMessage::Card { tab, card }).await.is_err() {
                    return;
                }
            }

            let duration_ms = start_time.elapsed().as_millis() as u64;
            tracing::debug!(total_cards, failed_cards, duration_ms, "dashboard stream complete");
            let _ = tx
                .send(StreamMessage::Complete(CompletionEvent {
                    total_cards,
                    failed_cards,
                    duration_ms,
                }))
                .await;
        });

        rx
    }
}

fn build_skeleton(definition: &DashboardDefinition) -> DashboardSkeleton {
    let tabs = definition
        .tabs
        .iter()
        .map(|tab| TabSkeleton {
            id: tab.id.clone(),
            title: tab.title.clone(),
            cards: tab
                .cards
                .iter()
                .map(|card| CardSkeleton {
                    id: card.id.clone(),
                    title: card.title.clone(),
                    chart: card.chart.kind().to_string(),
                    position: card.layout.position,
                })
                .collect(),
        })
        .collect();

    DashboardSkeleton {
        title: definition.title.clone(),
        tabs,
    }
}
