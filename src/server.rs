//! HTTP routes for the dashboard page, table JSON, CSV export and refresh.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::calendar::market_now;
use crate::render::{export_file_name, render_dashboard_html, RenderOptions, Theme};
use crate::source::DriverTableSource;
use crate::table::{DriverTable, TableError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub theme: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("table worker failed: {0}")]
    Worker(String),
    #[error("export failed: {0}")]
    Export(#[from] TableError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!(component = "server", event = "http.error", error = %self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[derive(Clone)]
struct DashboardAppState {
    source: Arc<dyn DriverTableSource>,
    options: RenderOptions,
}

pub fn dashboard_router(source: Arc<dyn DriverTableSource>, options: RenderOptions) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/table", get(get_dashboard_table))
        .route("/dashboard/export.csv", get(get_dashboard_export))
        .route("/dashboard/refresh", post(post_dashboard_refresh))
        .with_state(DashboardAppState { source, options })
}

/// Loading may run the builder, whose HTTP client blocks.
async fn load_table(source: Arc<dyn DriverTableSource>, force: bool) -> Result<DriverTable, ServerError> {
    tokio::task::spawn_blocking(move || {
        if force {
            source.force_refresh()
        } else {
            source.load()
        }
    })
    .await
    .map_err(|err| ServerError::Worker(err.to_string()))
}

fn resolve_theme(query: &DashboardQuery, default: Theme) -> Theme {
    query
        .theme
        .as_deref()
        .and_then(Theme::parse)
        .unwrap_or(default)
}

async fn get_dashboard_html(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Html<String>, ServerError> {
    let options = RenderOptions {
        theme: resolve_theme(&query, state.options.theme),
        ..state.options.clone()
    };
    let table = load_table(Arc::clone(&state.source), false).await?;
    info!(
        component = "server",
        event = "http.dashboard.request",
        rows = table.rows.len(),
        theme = options.theme.as_str()
    );
    Ok(Html(render_dashboard_html(&table, &options)))
}

async fn get_dashboard_table(
    State(state): State<DashboardAppState>,
) -> Result<Json<DriverTable>, ServerError> {
    let table = load_table(Arc::clone(&state.source), false).await?;
    info!(
        component = "server",
        event = "http.table.request",
        rows = table.rows.len()
    );
    Ok(Json(table))
}

async fn get_dashboard_export(State(state): State<DashboardAppState>) -> Result<Response, ServerError> {
    let table = load_table(Arc::clone(&state.source), false).await?;
    let export = table.without_meta();
    let body = export.to_csv_bytes()?;
    let file_name = export_file_name(market_now().date_naive());
    info!(
        component = "server",
        event = "http.export.request",
        rows = export.rows.len(),
        file_name = %file_name
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn post_dashboard_refresh(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Redirect, ServerError> {
    let table = load_table(Arc::clone(&state.source), true).await?;
    info!(
        component = "server",
        event = "http.refresh.request",
        rows = table.rows.len()
    );
    let theme = resolve_theme(&query, state.options.theme);
    Ok(Redirect::to(&format!("/dashboard?theme={}", theme.as_str())))
}
