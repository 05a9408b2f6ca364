/**
 * API REST DESKLINE - Surface HTTP du hub
 *
 * RÔLE : Interface d'origination des demandes (le guichet côté hub) et
 * lecture du miroir de disponibilité pour le dashboard.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes /health, /system/health, /desks, /requests
 * - Sérialisation JSON automatique des réponses
 * - Aucune authentification ici : c'est la couche applicative englobante
 *   qui en est responsable
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use deskline_core::availability::EndpointAvailability;
use deskline_core::messages::RequestStatus;
use deskline_core::transport::MqttTransport;
use deskline_core::AvailabilityTable;
use serde::Deserialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::health::{HealthTracker, HubHealth};
use crate::requests::{RequestRegistry, StoredRequest};

#[derive(Clone)]
pub struct AppState {
    pub table: AvailabilityTable,
    pub registry: Arc<RequestRegistry<MqttTransport>>,
    pub health_tracker: HealthTracker,
    pub transport: MqttTransport,
}

#[derive(serde::Serialize)]
struct DeskView {
    endpoint_id: u32,
    available: bool,
    last_update: String, // format RFC3339 pour l'API
    age_seconds: i64,
}

fn to_view(e: &EndpointAvailability) -> DeskView {
    let age = OffsetDateTime::now_utc() - e.last_update;
    DeskView {
        endpoint_id: e.endpoint_id,
        available: e.available,
        last_update: e.last_update.format(&Rfc3339).unwrap_or_default(),
        age_seconds: age.whole_seconds().max(0),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/desks", get(get_desks))
        .route("/desks/{id}", get(get_desk))
        .route("/requests", get(list_requests).post(create_request))
        .route("/requests/{id}/status", post(set_request_status))
        .with_state(app_state)
}

// GET /desks (liste du miroir de disponibilité)
async fn get_desks(State(app): State<AppState>) -> Json<Vec<DeskView>> {
    let list: Vec<DeskView> = app.table.snapshot().iter().map(to_view).collect();
    Json(list)
}

// GET /desks/:id (détail)
async fn get_desk(
    State(app): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DeskView>, StatusCode> {
    let Some(entry) = app.table.get(id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(to_view(&entry)))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    endpoint_id: Option<u32>,
}

// GET /requests?endpoint_id=3
async fn list_requests(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<StoredRequest>> {
    Json(app.registry.list(params.endpoint_id))
}

#[derive(Debug, Deserialize)]
struct CreateRequestBody {
    endpoint_id: u32,
    requester_name: String,
    details: String,
    course_code: Option<String>,
}

// POST /requests (origination d'une demande de consultation)
async fn create_request(
    State(app): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = app
        .registry
        .create(body.endpoint_id, body.requester_name, body.details, body.course_code)
        .await;
    (StatusCode::CREATED, Json(serde_json::json!({ "id": request.id, "status": "pending" })))
}

#[derive(Debug, Deserialize)]
struct SetStatusBody {
    status: RequestStatus,
}

// POST /requests/:id/status (cycle de vie pending -> accepted -> completed)
async fn set_request_status(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.set_status(id, body.status).await {
        Some(request) => Ok(Json(serde_json::json!({
            "id": request.id,
            "status": request.status.to_string(),
        }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// GET /system/health (état infrastructure)
async fn get_system_health(State(app): State<AppState>) -> Json<HubHealth> {
    let health = app
        .health_tracker
        .get_health(&app.table, &app.registry, &app.transport);
    Json(health)
}
