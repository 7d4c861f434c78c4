use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::database::models::SyncStateRow;
use crate::jobs::RunRequest;
use crate::models::{
    BatchStatus, DateRange, DomainOutcome, DomainReport, RunReport, SyncDomain, SyncMode,
    SyncPhase, SyncWindow, TickerFailure, UniverseSource,
};

/// OpenAPI specification of the control API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Market Data Sync API",
        version = "1.0.0",
        description = "Control surface of the market data synchronization engine",
        license(
            name = "MIT"
        )
    ),
    paths(
        handlers::health_check,
        handlers::get_last_report,
        handlers::get_watermarks,
        handlers::trigger_run,
        handlers::stop_run,
    ),
    components(
        schemas(
            HealthResponse,
            RunAcceptedResponse,
            StopResponse,
            ErrorResponse,
            RunRequest,
            RunReport,
            DomainReport,
            DomainOutcome,
            SyncPhase,
            SyncDomain,
            SyncMode,
            SyncWindow,
            DateRange,
            UniverseSource,
            TickerFailure,
            BatchStatus,
            SyncStateRow,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Sync", description = "Synchronization runs, reports, and watermarks"),
    )
)]
pub struct ApiDoc;
