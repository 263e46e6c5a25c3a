use std::sync::Arc;

use market_drivers::{
    dashboard_router, init_logging, log_app_bind, log_app_start, log_table_source, AppConfig,
    CachedTableSource, DriverTableSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = AppConfig::from_env()?;
    init_logging(&cfg.logging)?;
    log_app_start("dashboard_server", &cfg.logging);

    // The blocking reqwest client cannot be created on an async worker.
    let builder_cfg = cfg.clone();
    let builder =
        Arc::new(tokio::task::spawn_blocking(move || builder_cfg.dashboard_builder()).await??);

    log_table_source(
        &cfg.data_file,
        cfg.table_cache.ttl_secs,
        cfg.table_cache.max_file_age_secs,
    );
    let source: Arc<dyn DriverTableSource> = Arc::new(CachedTableSource::new(
        builder,
        cfg.data_file.clone(),
        cfg.table_cache.clone(),
    ));

    let app = dashboard_router(source, cfg.render.clone());
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
