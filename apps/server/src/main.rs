#![warn(clippy::all, clippy::pedantic)]

use std::env;
use std::net::SocketAddr;

use actix_web::{App, HttpServer};

mod error;
mod routes;

use error::AppError;
use logger::init_tracing;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let addr: SocketAddr = env::var("DXMONITOR_BIND").as_deref().unwrap_or(DEFAULT_BIND).parse()?;
    run_server(addr).await
}

async fn run_server(addr: SocketAddr) -> Result<(), AppError> {
    tracing::info!(%addr, "Starting HTTP server");

    HttpServer::new(|| App::new().configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
