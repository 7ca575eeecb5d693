pub mod config;
pub mod cors;
pub mod errors;
pub mod metrics_defs;
pub mod path;
pub mod router;
pub mod service;
pub mod store;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::config::Config;
use crate::cors::OriginFilter;
use crate::errors::GatewayError;
use crate::router::Router;
use crate::service::GatewayService;
use crate::store::RecordStore;
use crate::upstream::Dispatcher;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub async fn run(config: Config) -> Result<(), GatewayError> {
    let dispatcher = Dispatcher::new(&config.upstream)?;
    let origins = OriginFilter::new(&config.allowed_origins);

    tracing::info!(
        upstream = dispatcher.base_url(),
        recommend_path = dispatcher.explicit_path().unwrap_or("(auto-fallback)"),
        allowed_origins = ?origins.allowed_origins(),
        "Starting gateway"
    );

    let router = Router::new(
        dispatcher,
        RecordStore::new(),
        origins.allowed_origins().to_vec(),
        config.max_body_bytes,
    );
    let gateway_service = GatewayService::new(origins, router);
    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        gateway_service,
    );

    match &config.admin_listener {
        Some(admin) => {
            let admin_service = AdminService::<_, GatewayError>::new(|| true);
            let admin_task = run_http_service(&admin.host, admin.port, admin_service);
            tokio::try_join!(gateway_task, admin_task)?;
        }
        None => gateway_task.await?,
    }

    Ok(())
}
