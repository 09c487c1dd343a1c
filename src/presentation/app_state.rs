// Application state for HTTP handlers
use crate::application::composer::DashboardComposer;
use crate::application::streaming_service::StreamingDashboardService;

#[derive(Clone)]
pub struct AppState {
    pub composer: DashboardComposer,
    pub streaming_service: StreamingDashboardService,
}
