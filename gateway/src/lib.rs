pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod schemas;
pub mod service;

use courier::Courier;
use errors::GatewayError;
use service::{GatewayService, RelayHandler};
use shared::admin_service::AdminService;
use shared::http::run_http_service;

/// Serves the relay endpoints and the admin listener until either fails.
pub async fn run(config: config::Config, courier: Courier) -> Result<(), GatewayError> {
    let relay_service = GatewayService::new(RelayHandler::new(courier, config.internal_token));
    let admin_service = AdminService::<_, GatewayError>::new(|| true);

    let relay_task = run_http_service(&config.listener.host, config.listener.port, relay_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}
