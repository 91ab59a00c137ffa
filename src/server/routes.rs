//! HTTP route handlers.
//!
//! Thin transport over the engines: parse query parameters, run one
//! engine operation, encode the `ResultTable` as JSON records (default)
//! or CSV (`?format=csv`). Engine errors map to stable machine-readable
//! codes; a zero-row table is a 200, never an error.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::query::{ClassificationEngine, ExpressionEngine, QueryEngine};
use crate::server::{AppState, csv};
use crate::table::ResultTable;
use crate::{Error, GeneSelection};

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

/// Transport-side error: engine errors plus parameter-shape problems
/// that never reach an engine.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_parameter".to_string(),
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_request_error() {
            StatusCode::BAD_REQUEST
        } else if matches!(err, Error::StoreUnavailable(_)) {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Raw query pairs; repeated keys (gene_list, condition) are collected,
/// which `axum::extract::Query` into a map would lose.
pub struct Params(Vec<(String, String)>);

impl Params {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn get_all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn require(&self, key: &str) -> Result<&str, ApiError> {
        self.get(key)
            .ok_or_else(|| ApiError::bad_request(format!("missing required parameter: {key}")))
    }

    fn get_f64(&self, key: &str) -> Result<Option<f64>, ApiError> {
        self.get(key)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| ApiError::bad_request(format!("parameter {key} is not a number: {v}")))
            })
            .transpose()
    }

    fn get_usize(&self, key: &str) -> Result<Option<usize>, ApiError> {
        self.get(key)
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| ApiError::bad_request(format!("parameter {key} is not an integer: {v}")))
            })
            .transpose()
    }

    fn gene_selection(&self) -> GeneSelection {
        GeneSelection::from_ids(self.get_all("gene_list"))
    }
}

/// Encode a table per the `format` parameter, attaching any extra
/// top-level fields to the JSON shape.
fn table_response(
    table: &ResultTable,
    format: Option<&str>,
    extra: Vec<(&str, serde_json::Value)>,
) -> Response {
    if format == Some("csv") {
        return (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv::encode(table),
        )
            .into_response();
    }
    let mut body = serde_json::Map::new();
    body.insert("row_count".into(), serde_json::json!(table.len()));
    body.insert("rows".into(), serde_json::json!(table.to_records()));
    for (key, value) in extra {
        body.insert(key.into(), value);
    }
    Json(serde_json::Value::Object(body)).into_response()
}

pub async fn home() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the 8cubeDB API!",
        "endpoints": {
            "/config": "Vocabulary of analysis levels, types and block labels",
            "/specificity": "Gene specificity for a gene list (optionally one level/type)",
            "/psi_block": "Per-block psi decomposition for an analysis level/type",
            "/highly_specific": "Genes with high block-local psi for one block",
            "/non_specific": "Housekeeping genes (low global psi)",
            "/marker": "Marker genes (high block-local AND high global psi)",
            "/gene_expression": "Expression mean/variance for a gene list",
            "/stats": "Store row counts",
        }
    }))
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "analysis_config": state.vocab }))
}

pub async fn get_specificity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let selection = params.gene_selection();
    let level = params.get("analysis_level");
    let analysis_type = params.get("analysis_type");

    let store = state.open_specificity()?;
    let engine = QueryEngine::new(&store, &state.vocab);
    let table = match (level, analysis_type) {
        (Some(level), Some(analysis_type)) => {
            engine.get_specificity(&selection, level, analysis_type)?
        }
        (None, None) => engine.get_specificity_profile(&selection)?,
        _ => {
            return Err(ApiError::bad_request(
                "analysis_level and analysis_type must be supplied together",
            ));
        }
    };
    Ok(table_response(&table, params.get("format"), vec![]))
}

pub async fn get_psi_block(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let level = params.require("analysis_level")?;
    let analysis_type = params.require("analysis_type")?;
    let block_label = params.get("block_label");
    let selection = params.gene_selection();

    let store = state.open_specificity()?;
    let engine = QueryEngine::new(&store, &state.vocab);
    let table = engine.get_psi_block(&selection, level, analysis_type, block_label)?;
    Ok(table_response(&table, params.get("format"), vec![]))
}

pub async fn get_highly_specific(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let level = params.require("analysis_level")?;
    let analysis_type = params.require("analysis_type")?;
    let block_label = params.require("block_label")?;
    let cutoff = params
        .get_f64("psi_block_cutoff")?
        .unwrap_or(state.thresholds.block_psi);
    let top_k = params.get_usize("top_k")?;

    let store = state.open_specificity()?;
    let engine = ClassificationEngine::new(&store, &state.vocab);
    let table = engine.highly_specific(level, analysis_type, block_label, cutoff, top_k)?;
    Ok(table_response(&table, params.get("format"), vec![]))
}

pub async fn get_non_specific(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let level = params.require("analysis_level")?;
    let analysis_type = params.require("analysis_type")?;
    let cutoff = params
        .get_f64("psi_cutoff")?
        .unwrap_or(state.thresholds.housekeeping_psi);

    let store = state.open_specificity()?;
    let engine = ClassificationEngine::new(&store, &state.vocab);
    let table = engine.non_specific(level, analysis_type, cutoff)?;
    Ok(table_response(&table, params.get("format"), vec![]))
}

pub async fn get_marker(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let level = params.require("analysis_level")?;
    let analysis_type = params.require("analysis_type")?;
    let block_label = params.require("block_label")?;
    let block_cutoff = params
        .get_f64("psi_block_cutoff")?
        .unwrap_or(state.thresholds.block_psi);
    let global_cutoff = params
        .get_f64("psi_cutoff")?
        .unwrap_or(state.thresholds.global_psi);

    let store = state.open_specificity()?;
    let engine = ClassificationEngine::new(&store, &state.vocab);
    let table = engine.marker(level, analysis_type, block_label, block_cutoff, global_cutoff)?;
    Ok(table_response(&table, params.get("format"), vec![]))
}

pub async fn get_gene_expression(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let params = Params(params);
    let selection = params.gene_selection();
    let conditions = params.get_all("condition");

    let store = state.open_expression()?;
    let engine = ExpressionEngine::new(&store);
    let table = engine.get_expression(&selection, &conditions)?;
    let missing = ExpressionEngine::missing_genes(&selection, &table);
    Ok(table_response(
        &table,
        params.get("format"),
        vec![("missing_genes", serde_json::json!(missing))],
    ))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let store = state.open_specificity()?;
    let expression = state.open_expression()?;
    let stats = crate::storage::DbStats {
        specificity_rows: store.count_specificity()?,
        psi_block_rows: store.count_psi_block()?,
        expression_rows: expression.count_expression()?,
    };
    Ok(Json(serde_json::json!(stats)).into_response())
}
