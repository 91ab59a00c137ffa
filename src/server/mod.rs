//! HTTP transport: axum server over the query engines.
//!
//! Each request is an independent, stateless read: handlers open the
//! stores read-only per request, so concurrent requests only rely on
//! SQLite's reader isolation. The vocabulary is discovered once at
//! startup and shared immutably.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Thresholds;
use crate::storage::{ExpressionStore, SpecificityStore};
use crate::vocab::ConfigVocabulary;
use crate::Result;

pub mod csv;
pub mod mcp;
pub mod routes;

/// Server state
pub struct AppState {
    pub database_path: PathBuf,
    pub expression_database_path: PathBuf,
    pub vocab: ConfigVocabulary,
    pub thresholds: Thresholds,
}

impl AppState {
    pub fn open_specificity(&self) -> Result<SpecificityStore> {
        SpecificityStore::open(&self.database_path)
    }

    pub fn open_expression(&self) -> Result<ExpressionStore> {
        ExpressionStore::open(&self.expression_database_path)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/config", get(routes::get_config))
        .route("/specificity", get(routes::get_specificity))
        .route("/psi_block", get(routes::get_psi_block))
        .route("/highly_specific", get(routes::get_highly_specific))
        .route("/non_specific", get(routes::get_non_specific))
        .route("/marker", get(routes::get_marker))
        .route("/gene_expression", get(routes::get_gene_expression))
        .route("/stats", get(routes::get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    database_path: PathBuf,
    expression_database_path: PathBuf,
    thresholds: Thresholds,
) -> anyhow::Result<()> {
    // Discover the vocabulary once; request handlers only read it.
    let store = SpecificityStore::open(&database_path)?;
    let vocab = ConfigVocabulary::discover(&store)?;
    drop(store);
    if vocab.is_empty() {
        tracing::warn!("specificity store has no analysis levels; all queries will be rejected");
    }

    let state = Arc::new(AppState {
        database_path,
        expression_database_path,
        vocab,
        thresholds,
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting server on {}", addr);
    println!("🌍 8cubeDB API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
