use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use clap::Parser;
use controller_core::telemetry;
use job_pod_reaper::{run, KubeStore, Settings, State};
use prometheus::{Encoder, TextEncoder};
use tracing::*;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => {
            error!(error = %err, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    telemetry::init(settings.log_format, &settings.log_level).await?;

    let state = State::default();
    let store = KubeStore::try_from_settings(&settings).await?;
    let listen_address = settings.listen_address.clone();
    let ctx = state.to_context(store, settings)?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(&listen_address)?
    .shutdown_timeout(5);
    info!(address = %listen_address, "Listening for HTTP requests");

    tokio::select! {
        served = server.run() => served?,
        reaped = run(ctx) => {
            if let Err(err) = reaped {
                error!(error = %err, "Reaper exited with errors");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
