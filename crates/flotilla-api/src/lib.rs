//! flotilla-api — REST surface of the fleet control plane.
//!
//! Scale triggers, suspend switches, and read-only fleet inspection.
//! Trigger responses realize the uniform stage-result wrapper at the
//! HTTP boundary: 200 with the operation envelope on success, 500 with
//! the same envelope when the pipeline ended in its failed terminal.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/scale/out` | Run the scale-out workflow |
//! | POST | `/api/v1/scale/in` | Run the scale-in workflow |
//! | POST | `/api/v1/fleet/drain` | Remove dynamic members until none remain |
//! | GET | `/api/v1/fleet?filter=group\|dynamic` | List fleet members |
//! | GET | `/api/v1/records` | List the weighted record set |
//! | GET | `/api/v1/executions` | List running executions |
//! | GET | `/api/v1/status` | Control plane status |
//! | GET | `/api/v1/suspend/{add\|remove}` | Read a suspend flag |
//! | PUT | `/api/v1/suspend/{add\|remove}` | Set a suspend flag |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use flotilla_dns::WeightedDnsManager;
use flotilla_fleet::FleetInventory;
use flotilla_provider::SuspendSwitch;
use flotilla_workflow::{ExecutionRegistry, OperationGuard, WorkflowExecutor};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub executor: Arc<WorkflowExecutor>,
    pub inventory: FleetInventory,
    pub dns: WeightedDnsManager,
    pub registry: ExecutionRegistry,
    pub guard: OperationGuard,
    pub suspend: Arc<dyn SuspendSwitch>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/scale/out", post(handlers::scale_out))
        .route("/scale/in", post(handlers::scale_in))
        .route("/fleet", get(handlers::list_fleet))
        .route("/fleet/drain", post(handlers::drain_fleet))
        .route("/records", get(handlers::list_records))
        .route("/executions", get(handlers::list_executions))
        .route("/status", get(handlers::status))
        .route(
            "/suspend/{workflow}",
            get(handlers::get_suspend).put(handlers::put_suspend),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
