// Application state for HTTP handlers
use crate::application::live_stream::LiveStreamService;
use crate::application::trend_service::TrendService;

#[derive(Clone)]
pub struct AppState {
    pub trend_service: TrendService,
    pub live_stream: LiveStreamService,
}
