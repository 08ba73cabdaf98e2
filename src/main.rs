use actix_web::{web, App, HttpServer};
use nexus_reconciler::api;
use nexus_reconciler::broker::BrokerGateway;
use nexus_reconciler::broker::bridge::BridgeGateway;
use nexus_reconciler::broker::simulated::SimulatedBroker;
use nexus_reconciler::config::{BrokerMode, Settings};
use nexus_reconciler::context::ReconcileContext;
use nexus_reconciler::ledger::TradeLedger;
use nexus_reconciler::model::ClosureEvent;
use nexus_reconciler::reconciler::{Reconciler, ReconcilerConfig};
use nexus_reconciler::scheduler::{LoopSettings, ReconcileLoop};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Settings::new()?;
    init_tracing(settings.logging.json);

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║               NEXUS RECONCILER                                ║");
    info!("║               Broker Position Reconciliation                  ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");

    // The simulated broker is also handed to the API so dry runs can be scripted.
    let (gateway, simulated): (Arc<dyn BrokerGateway>, Option<Arc<SimulatedBroker>>) =
        match settings.broker.mode {
            BrokerMode::Bridge => {
                info!("Using terminal bridge at {}", settings.broker.bridge_url);
                let bridge: Arc<dyn BrokerGateway> = Arc::new(BridgeGateway::new(&settings.broker)?);
                (bridge, None)
            }
            BrokerMode::Simulated => {
                info!("Using simulated broker - positions are scripted through the API");
                let broker = Arc::new(SimulatedBroker::new());
                let gateway: Arc<dyn BrokerGateway> = broker.clone();
                (gateway, Some(broker))
            }
        };

    let reconciler = Reconciler::new(
        ReconcilerConfig {
            lookback: settings.lookback(),
        },
        ReconcileContext::new_system(),
    );

    // Closures fan out to a logging task; the loop never blocks on observers.
    let (closure_tx, mut closure_rx) = mpsc::unbounded_channel::<ClosureEvent>();
    let observer_handle = tokio::spawn(async move {
        while let Some(event) = closure_rx.recv().await {
            info!(
                position_id = %event.position_id,
                symbol = %event.symbol,
                profit = %event.realized_profit,
                "📉 Closure notification"
            );
        }
    });

    let (reconcile_loop, handle) = ReconcileLoop::new(
        reconciler,
        gateway,
        TradeLedger::new(),
        closure_tx,
        LoopSettings {
            interval: settings.interval(),
            max_backoff: settings.max_backoff(),
        },
    );
    let loop_task = tokio::spawn(reconcile_loop.run());
    info!("✅ Reconcile loop spawned");

    // --- API Server Task ---
    let bind_address = format!("{}:{}", settings.api.host, settings.api.port);
    info!("🚀 Starting API Server on {}", bind_address);

    let handle_for_api = handle.clone();
    // Actix handles SIGINT/SIGTERM and returns once the server has drained.
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        let mut app = App::new()
            .wrap(cors)
            .app_data(web::Data::new(handle_for_api.clone()));
        if let Some(broker) = &simulated {
            app = app.app_data(web::Data::new(broker.clone()));
        }
        app.configure(api::config)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    info!("API server stopped - shutting down reconcile loop");
    if handle.shutdown().is_err() {
        error!("Reconcile loop already stopped");
    }

    match loop_task.await {
        Ok(ledger) => info!(
            tracked = ledger.tracker().len(),
            symbols = ledger.statistics().symbols().len(),
            "Final ledger state"
        ),
        Err(e) => error!("Reconcile loop task failed: {}", e),
    }
    let _ = observer_handle.await;

    Ok(())
}
