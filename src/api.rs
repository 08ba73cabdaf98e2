use crate::broker::simulated::SimulatedBroker;
use crate::metrics;
use crate::model::{ClosureEvent, OpenPosition};
use crate::reconciler::ReconcileError;
use crate::scheduler::LoopHandle;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReconcileResponse {
    closures: Vec<ClosureEvent>,
}

#[derive(Deserialize)]
pub struct SimulatedClose {
    pub profit: Decimal,
    #[serde(default)]
    pub symbol: String,
}

fn loop_gone() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "error": "Reconcile loop is not running"
    }))
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_positions(handle: web::Data<LoopHandle>) -> impl Responder {
    let status = handle.status();
    HttpResponse::Ok().json(serde_json::json!({
        "positions": status.positions,
        "as_of": status.as_of,
    }))
}

/// Fill report from the execution side. Applied asynchronously by the loop.
///
/// With a simulated broker attached, the position is opened there too so the
/// next pass sees it as live.
pub async fn record_position(
    handle: web::Data<LoopHandle>,
    simulated: Option<web::Data<Arc<SimulatedBroker>>>,
    body: web::Json<OpenPosition>,
) -> impl Responder {
    let position = body.into_inner();
    let position_id = position.position_id.clone();
    if let Some(broker) = &simulated {
        broker.open(&position_id);
    }
    match handle.record_open(position) {
        Ok(()) => {
            info!(position_id = %position_id, "Open position accepted");
            HttpResponse::Accepted().json(serde_json::json!({ "position_id": position_id }))
        }
        Err(_) => loop_gone(),
    }
}

pub async fn get_statistics(handle: web::Data<LoopHandle>) -> impl Responder {
    let status = handle.status();
    HttpResponse::Ok().json(serde_json::json!({
        "statistics": status.statistics,
        "last_pass": status.last_pass,
    }))
}

pub async fn get_symbol_statistics(
    handle: web::Data<LoopHandle>,
    path: web::Path<String>,
) -> impl Responder {
    let symbol = path.into_inner();
    match handle.status().statistics.get(&symbol) {
        Some(view) => HttpResponse::Ok().json(view),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("No statistics for {}", symbol)
        })),
    }
}

pub async fn reconcile_now(handle: web::Data<LoopHandle>) -> impl Responder {
    match handle.reconcile_now().await {
        Ok(Ok(closures)) => HttpResponse::Ok().json(ReconcileResponse { closures }),
        Ok(Err(e @ ReconcileError::BrokerUnavailable(_))) => {
            warn!(error = %e, "On-demand reconcile aborted");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        Err(_) => loop_gone(),
    }
}

pub async fn pause(handle: web::Data<LoopHandle>) -> impl Responder {
    match handle.pause() {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "paused": true })),
        Err(_) => loop_gone(),
    }
}

pub async fn resume(handle: web::Data<LoopHandle>) -> impl Responder {
    match handle.resume() {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "paused": false })),
        Err(_) => loop_gone(),
    }
}

/// Close a position on the simulated broker with the given profit.
pub async fn simulated_close(
    simulated: Option<web::Data<Arc<SimulatedBroker>>>,
    path: web::Path<String>,
    body: web::Json<SimulatedClose>,
) -> impl Responder {
    let Some(broker) = simulated else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "Broker is not simulated"
        }));
    };
    let position_id = path.into_inner();
    let close = body.into_inner();
    broker.close(&position_id, &close.symbol, close.profit, Utc::now());
    info!(position_id = %position_id, profit = %close.profit, "Simulated close recorded");
    HttpResponse::Accepted().json(serde_json::json!({ "position_id": position_id }))
}

pub async fn prometheus_metrics() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}

// Define scope configuration
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(
            web::resource("/positions")
                .route(web::get().to(get_positions))
                .route(web::post().to(record_position)),
        )
        .service(web::resource("/statistics").route(web::get().to(get_statistics)))
        .service(
            web::resource("/statistics/{symbol}").route(web::get().to(get_symbol_statistics)),
        )
        .service(web::resource("/reconcile").route(web::post().to(reconcile_now)))
        .service(web::resource("/control/pause").route(web::post().to(pause)))
        .service(web::resource("/control/resume").route(web::post().to(resume)))
        .service(
            web::resource("/simulated/positions/{position_id}/close")
                .route(web::post().to(simulated_close)),
        )
        .service(web::resource("/metrics").route(web::get().to(prometheus_metrics)));
}
