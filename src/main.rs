use actix_web::{get, web, HttpResponse, Responder};
use clap::Parser;
use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::Api,
    client::Client,
    runtime::{controller::Controller, watcher::Config},
    CustomResourceExt,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;

use gopass_operator::config::OperatorConfig;
use gopass_operator::{
    controller, owner_of, telemetry, ContextData, GopassRepository, GrpcConnector, KubeCluster,
    Metrics, REPO_NAME_LABEL,
};

#[derive(Serialize, Deserialize)]
struct Health {
    status: String,
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(Health {
        status: "ok".to_string(),
    })
}

#[get("/metrics")]
pub async fn metrics(registry: web::Data<Registry>) -> impl Responder {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    //init dotenv
    dotenv::dotenv().ok();
    let config = OperatorConfig::parse();

    if config.crd {
        println!("{}", serde_json::to_string_pretty(&GopassRepository::crd())?);
        return Ok(());
    }

    telemetry::init();

    let kubernetes_client = Client::try_default().await?;

    let crd_api: Api<GopassRepository> = Api::all(kubernetes_client.clone());
    let deployments: Api<Deployment> =
        Api::namespaced(kubernetes_client.clone(), &config.namespace);

    let registry = Registry::new();
    let operator_metrics = Metrics::new()?.register(&registry)?;

    let context: Arc<ContextData> = Arc::new(ContextData::new(
        Arc::new(KubeCluster::new(
            kubernetes_client.clone(),
            config.namespace.clone(),
        )),
        Arc::new(GrpcConnector),
        config.server_template(),
        operator_metrics,
    ));

    //start server for health check and metrics
    let registry = web::Data::new(registry);
    let srv = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(registry.clone())
            .wrap(TracingLogger::default())
            .service(health)
            .service(metrics)
    })
    .bind(config.health_addr)?
    .shutdown_timeout(5);

    //deployment status changes re-trigger the owning repository
    let controller = Controller::new(crd_api.clone(), Config::default().any_semantic())
        .watches(
            deployments,
            Config::default().labels(REPO_NAME_LABEL),
            |deployment| owner_of(&deployment),
        )
        .run(controller::reconcile, controller::on_error, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok((repository, action)) => {
                    info!(
                        "Reconciliation successful. Resource: {}, action: {:?}",
                        repository, action
                    );
                }
                Err(reconciliation_err) => {
                    error!("Reconciliation error: {:?}", reconciliation_err)
                }
            }
        });

    let _server = tokio::spawn(srv.run());

    let _contro = tokio::spawn(controller);

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sig_term.recv() => log::info!("SIGTERM received"),
        _ = sig_int.recv() => log::info!("SIGINT received"),
    }

    Ok(())
}
