use crate::api::routes;
use crate::config::Shared;
use crate::zone::SharedZoneManager;
use std::future::Future;
use std::net::SocketAddr;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: Shared,
    pub zones: SharedZoneManager,
}

pub fn new(
    config: Shared,
    zones: SharedZoneManager,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr).serve(
        routes::new(AppState { config, zones })
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
}
