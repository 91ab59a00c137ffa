//! MCP stdio transport: the engines exposed as tools for LLM clients.
//!
//! Tool output is plain text shaped for a model context window, not a
//! full dump: row-capped tables, capped gene lists and small unicode
//! bar charts. Request-side engine errors (unknown vocabulary entries,
//! out-of-range cutoffs) surface as InvalidParams so clients can
//! correct the call.

use std::path::PathBuf;

use async_trait::async_trait;
use mcp_sdk_rs::error::{Error, ErrorCode};
use mcp_sdk_rs::server::{Server, ServerHandler};
use mcp_sdk_rs::transport::stdio::StdioTransport;
use mcp_sdk_rs::types::{
    ClientCapabilities, Implementation, ListToolsResult, ServerCapabilities, Tool, ToolResult,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::config::Thresholds;
use crate::query::{ClassificationEngine, ExpressionEngine, QueryEngine};
use crate::storage::{ExpressionStore, SpecificityStore};
use crate::table::ResultTable;
use crate::vocab::ConfigVocabulary;
use crate::GeneSelection;

/// Rows shown before a table is elided in tool output.
const MAX_DISPLAY_ROWS: usize = 50;
/// Gene names listed inline before eliding.
const MAX_LIST_GENES: usize = 20;
/// Width of the Ψ bar charts in characters (Ψ spans [0, 1]).
const BAR_WIDTH: usize = 20;

const METRICS_HELP: &str = "\
Metrics:
- psi_mean (Ψ): specificity in [0, 1]. 0 = expression spread evenly \
across all blocks (housekeeping-like), 1 = expression concentrated in \
a single block.
- zeta_mean (ζ): reproducibility of the specificity pattern across \
founder replicates, in [0, 1].
- psi_block: one block's contribution to a gene's Ψ; the per-block \
values for a gene sum to its global Ψ.";

#[derive(Deserialize)]
struct CallToolRequest {
    name: String,
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct SpecificityArgs {
    gene_list: Vec<String>,
    analysis_level: Option<String>,
    analysis_type: Option<String>,
}

#[derive(Deserialize)]
struct PsiBlockArgs {
    analysis_level: String,
    analysis_type: String,
    gene_list: Option<Vec<String>>,
    block_label: Option<String>,
}

#[derive(Deserialize)]
struct ExpressionArgs {
    gene_list: Vec<String>,
    condition: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct MarkerArgs {
    analysis_level: String,
    analysis_type: String,
    block_label: String,
    psi_block_cutoff: Option<f64>,
    psi_cutoff: Option<f64>,
}

#[derive(Deserialize)]
struct HousekeepingArgs {
    analysis_level: String,
    analysis_type: String,
    psi_cutoff: Option<f64>,
}

#[derive(Deserialize)]
struct HighlySpecificArgs {
    analysis_level: String,
    analysis_type: String,
    block_label: String,
    psi_block_cutoff: Option<f64>,
    top_k: Option<usize>,
}

#[derive(Clone)]
pub struct McpService {
    database_path: PathBuf,
    expression_database_path: PathBuf,
    vocab: ConfigVocabulary,
    thresholds: Thresholds,
}

impl McpService {
    pub fn new(
        database_path: PathBuf,
        expression_database_path: PathBuf,
        vocab: ConfigVocabulary,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            database_path,
            expression_database_path,
            vocab,
            thresholds,
        }
    }

    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        let (read_tx, read_rx) = mpsc::channel::<String>(32);
        let (write_tx, mut write_rx) = mpsc::channel::<String>(32);

        // Stdin reader
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if read_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        // Stdout writer
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(msg) = write_rx.recv().await {
                let _ = stdout.write_all(msg.as_bytes()).await;
                let _ = stdout.write_all(b"\n").await;
                let _ = stdout.flush().await;
            }
        });

        let transport = StdioTransport::new(read_rx, write_tx);
        let server = Server::new(Arc::new(transport), Arc::new(self.clone()));
        server.start().await?;
        Ok(())
    }

    fn open_specificity(&self) -> Result<SpecificityStore, Error> {
        SpecificityStore::open(&self.database_path).map_err(engine_error)
    }

    fn open_expression(&self) -> Result<ExpressionStore, Error> {
        ExpressionStore::open(&self.expression_database_path).map_err(engine_error)
    }

    fn config_text(&self) -> String {
        let mut out = String::from("Available analysis vocabulary:\n");
        for level in self.vocab.levels() {
            out.push_str(&format!("\n{level}:\n"));
            for analysis_type in self.vocab.types(level) {
                let blocks = self.vocab.blocks(level, analysis_type);
                out.push_str(&format!(
                    "  {analysis_type}: {} blocks ({})\n",
                    blocks.len(),
                    elide_list(&blocks, 8)
                ));
            }
        }
        out.push('\n');
        out.push_str(METRICS_HELP);
        out
    }

    fn specificity_text(&self, args: SpecificityArgs) -> Result<String, Error> {
        let store = self.open_specificity()?;
        let engine = QueryEngine::new(&store, &self.vocab);
        let selection = GeneSelection::from_ids(args.gene_list);
        let table = match (args.analysis_level, args.analysis_type) {
            (Some(level), Some(analysis_type)) => engine
                .get_specificity(&selection, &level, &analysis_type)
                .map_err(engine_error)?,
            (None, None) => engine
                .get_specificity_profile(&selection)
                .map_err(engine_error)?,
            _ => {
                return Err(Error::protocol(
                    ErrorCode::InvalidParams,
                    "analysis_level and analysis_type must be supplied together",
                ));
            }
        };
        if table.is_empty() {
            return Ok("No specificity rows for the requested genes.".to_string());
        }
        Ok(format!(
            "{}\n{}",
            specificity_summary(&table),
            render_rows(&table)
        ))
    }

    fn psi_block_text(&self, args: PsiBlockArgs) -> Result<String, Error> {
        let store = self.open_specificity()?;
        let engine = QueryEngine::new(&store, &self.vocab);
        let selection = GeneSelection::from_ids(args.gene_list.unwrap_or_default());
        let table = engine
            .get_psi_block(
                &selection,
                &args.analysis_level,
                &args.analysis_type,
                args.block_label.as_deref(),
            )
            .map_err(engine_error)?;
        if table.is_empty() {
            return Ok("No psi_block rows for the requested genes.".to_string());
        }
        Ok(psi_block_charts(&table))
    }

    fn expression_text(&self, args: ExpressionArgs) -> Result<String, Error> {
        let store = self.open_expression()?;
        let engine = ExpressionEngine::new(&store);
        let selection = GeneSelection::from_ids(args.gene_list);
        let conditions = args.condition.unwrap_or_default();
        let table = engine
            .get_expression(&selection, &conditions)
            .map_err(engine_error)?;
        let missing = ExpressionEngine::missing_genes(&selection, &table);
        let mut out = if table.is_empty() {
            "No expression rows for the requested genes.".to_string()
        } else {
            render_rows(&table)
        };
        if !missing.is_empty() {
            out.push_str(&format!(
                "\nNo expression data for: {}",
                elide_list(&missing, MAX_LIST_GENES)
            ));
        }
        Ok(out)
    }

    fn marker_text(&self, args: MarkerArgs) -> Result<String, Error> {
        let store = self.open_specificity()?;
        let engine = ClassificationEngine::new(&store, &self.vocab);
        let block_cutoff = args.psi_block_cutoff.unwrap_or(self.thresholds.block_psi);
        let global_cutoff = args.psi_cutoff.unwrap_or(self.thresholds.global_psi);
        let table = engine
            .marker(
                &args.analysis_level,
                &args.analysis_type,
                &args.block_label,
                block_cutoff,
                global_cutoff,
            )
            .map_err(engine_error)?;
        Ok(format!(
            "{} marker genes for {}/{} block '{}' (psi_block > {block_cutoff}, psi_mean > {global_cutoff}):\n{}",
            table.len(),
            args.analysis_level,
            args.analysis_type,
            args.block_label,
            gene_list_text(&table)
        ))
    }

    fn housekeeping_text(&self, args: HousekeepingArgs) -> Result<String, Error> {
        let store = self.open_specificity()?;
        let engine = ClassificationEngine::new(&store, &self.vocab);
        let cutoff = args.psi_cutoff.unwrap_or(self.thresholds.housekeeping_psi);
        let table = engine
            .non_specific(&args.analysis_level, &args.analysis_type, cutoff)
            .map_err(engine_error)?;
        Ok(format!(
            "{} housekeeping genes for {}/{} (psi_mean < {cutoff}):\n{}",
            table.len(),
            args.analysis_level,
            args.analysis_type,
            gene_list_text(&table)
        ))
    }

    fn highly_specific_text(&self, args: HighlySpecificArgs) -> Result<String, Error> {
        let store = self.open_specificity()?;
        let engine = ClassificationEngine::new(&store, &self.vocab);
        let cutoff = args.psi_block_cutoff.unwrap_or(self.thresholds.block_psi);
        let table = engine
            .highly_specific(
                &args.analysis_level,
                &args.analysis_type,
                &args.block_label,
                cutoff,
                args.top_k,
            )
            .map_err(engine_error)?;
        Ok(format!(
            "{} highly specific genes for {}/{} block '{}' (psi_block > {cutoff}):\n{}",
            table.len(),
            args.analysis_level,
            args.analysis_type,
            args.block_label,
            gene_list_text(&table)
        ))
    }
}

/// Engine errors the caller can fix map to InvalidParams; store and IO
/// failures are internal.
fn engine_error(err: crate::Error) -> Error {
    Error::protocol(error_code_for(&err), err.to_string())
}

fn error_code_for(err: &crate::Error) -> ErrorCode {
    if err.is_request_error() {
        ErrorCode::InvalidParams
    } else {
        ErrorCode::InternalError
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Option<Value>) -> Result<T, Error> {
    serde_json::from_value(arguments.unwrap_or(serde_json::json!({})))
        .map_err(|e| Error::protocol(ErrorCode::InvalidParams, e.to_string()))
}

fn elide_list<S: AsRef<str>>(items: &[S], cap: usize) -> String {
    let shown: Vec<&str> = items.iter().take(cap).map(|s| s.as_ref()).collect();
    let mut out = shown.join(", ");
    if items.len() > cap {
        out.push_str(&format!(", ... and {} more", items.len() - cap));
    }
    out
}

/// Row-capped plain-text rendering of a result table.
fn render_rows(table: &ResultTable) -> String {
    let mut out = table.columns().join(" | ");
    out.push('\n');
    for row in table.rows().iter().take(MAX_DISPLAY_ROWS) {
        let fields: Vec<String> = row.iter().map(|cell| cell.display()).collect();
        out.push_str(&fields.join(" | "));
        out.push('\n');
    }
    if table.len() > MAX_DISPLAY_ROWS {
        out.push_str(&format!(
            "... {} of {} rows shown\n",
            MAX_DISPLAY_ROWS,
            table.len()
        ));
    }
    out
}

/// Capped "gene (Ψ=...)" list from a classification table, one per line.
fn gene_list_text(table: &ResultTable) -> String {
    if table.is_empty() {
        return "(none)".to_string();
    }
    let psi_column = if table.column_index("psi_block").is_some() {
        "psi_block"
    } else {
        "psi_mean"
    };
    let genes = table.column_values("gene_name");
    let psis = table.column_values(psi_column);
    let mut out = String::new();
    for (gene, psi) in genes.iter().zip(&psis).take(MAX_LIST_GENES) {
        match (gene.as_str(), psi.as_f64()) {
            (Some(g), Some(p)) => out.push_str(&format!("- {g} ({psi_column}={p:.3})\n")),
            (Some(g), None) => out.push_str(&format!("- {g}\n")),
            _ => {}
        }
    }
    if table.len() > MAX_LIST_GENES {
        out.push_str(&format!("... and {} more", table.len() - MAX_LIST_GENES));
    }
    out.trim_end().to_string()
}

/// For per-(level, type) specificity rows, a one-line ranking of the
/// three most specific genes by Ψ with ζ alongside.
fn specificity_summary(table: &ResultTable) -> String {
    let genes = table.column_values("gene_name");
    let psis = table.column_values("psi_mean");
    let zetas = table.column_values("zeta_mean");
    let mut ranked: Vec<(&str, f64, f64)> = genes
        .iter()
        .zip(&psis)
        .zip(&zetas)
        .filter_map(|((g, p), z)| Some((g.as_str()?, p.as_f64()?, z.as_f64()?)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
    let top: Vec<String> = ranked
        .iter()
        .take(3)
        .map(|(g, p, z)| format!("{g} (Ψ={p:.3}, ζ={z:.3})"))
        .collect();
    format!("Most specific: {}", top.join(", "))
}

/// Per-gene bar chart of block contributions, largest first, capped at
/// ten blocks per gene.
fn psi_block_charts(table: &ResultTable) -> String {
    let genes = table.column_values("gene_name");
    let blocks = table.column_values("block_label");
    let psis = table.column_values("psi_block");
    let mut out = String::new();
    let mut current: Option<&str> = None;
    let mut gene_rows: Vec<(&str, f64)> = Vec::new();

    let flush = |gene: &str, rows: &mut Vec<(&str, f64)>, out: &mut String| {
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        out.push_str(&format!("{gene}:\n"));
        for (block, psi) in rows.iter().take(10) {
            let filled = (psi.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
            out.push_str(&format!(
                "  {block:<20} {:<width$} {psi:.3}\n",
                "█".repeat(filled),
                width = BAR_WIDTH
            ));
        }
        if rows.len() > 10 {
            out.push_str(&format!("  ... and {} more blocks\n", rows.len() - 10));
        }
        rows.clear();
    };

    for ((gene, block), psi) in genes.iter().zip(&blocks).zip(&psis) {
        let (Some(gene), Some(block), Some(psi)) = (gene.as_str(), block.as_str(), psi.as_f64())
        else {
            continue;
        };
        if current != Some(gene) {
            if let Some(prev) = current {
                flush(prev, &mut gene_rows, &mut out);
            }
            current = Some(gene);
        }
        gene_rows.push((block, psi));
    }
    if let Some(prev) = current {
        flush(prev, &mut gene_rows, &mut out);
    }
    out.trim_end().to_string()
}

fn schema<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::protocol(ErrorCode::ParseError, e.to_string()))
}

#[async_trait]
impl ServerHandler for McpService {
    async fn initialize(
        &self,
        _implementation: Implementation,
        _capabilities: ClientCapabilities,
    ) -> Result<ServerCapabilities, Error> {
        Ok(ServerCapabilities::default())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn handle_method(&self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        match method {
            "tools/list" => {
                let tools = vec![
                    Tool {
                        name: "get_config".to_string(),
                        description: "List the analysis levels, analysis types and block labels \
                                      available in the specificity store, with metric definitions"
                            .to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {}
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_gene_specificity".to_string(),
                        description: "Global specificity (psi) and reproducibility (zeta) for a \
                                      gene list, for one analysis level/type or across all of them"
                            .to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "gene_list": { "type": "array", "items": { "type": "string" } },
                                "analysis_level": { "type": "string" },
                                "analysis_type": { "type": "string" }
                            },
                            "required": ["gene_list"]
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_psi_block".to_string(),
                        description: "Per-block psi decomposition for an analysis level/type, \
                                      rendered as bar charts per gene".to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "analysis_level": { "type": "string" },
                                "analysis_type": { "type": "string" },
                                "gene_list": { "type": "array", "items": { "type": "string" } },
                                "block_label": { "type": "string" }
                            },
                            "required": ["analysis_level", "analysis_type"]
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_gene_expression".to_string(),
                        description: "Expression mean and variance for a gene list, optionally \
                                      restricted to specific conditions".to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "gene_list": { "type": "array", "items": { "type": "string" } },
                                "condition": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["gene_list"]
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_marker_genes".to_string(),
                        description: "Marker genes for one block: high block-local psi AND high \
                                      global psi, with independently configurable cutoffs"
                            .to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "analysis_level": { "type": "string" },
                                "analysis_type": { "type": "string" },
                                "block_label": { "type": "string" },
                                "psi_block_cutoff": { "type": "number" },
                                "psi_cutoff": { "type": "number" }
                            },
                            "required": ["analysis_level", "analysis_type", "block_label"]
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_housekeeping_genes".to_string(),
                        description: "Non-specific (housekeeping) genes: global psi below the \
                                      cutoff for an analysis level/type".to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "analysis_level": { "type": "string" },
                                "analysis_type": { "type": "string" },
                                "psi_cutoff": { "type": "number" }
                            },
                            "required": ["analysis_level", "analysis_type"]
                        }))?,
                        annotations: None,
                    },
                    Tool {
                        name: "get_highly_specific_genes".to_string(),
                        description: "Genes whose block-local psi for one block exceeds the \
                                      cutoff, sorted by contribution".to_string(),
                        input_schema: schema(serde_json::json!({
                            "type": "object",
                            "properties": {
                                "analysis_level": { "type": "string" },
                                "analysis_type": { "type": "string" },
                                "block_label": { "type": "string" },
                                "psi_block_cutoff": { "type": "number" },
                                "top_k": { "type": "integer" }
                            },
                            "required": ["analysis_level", "analysis_type", "block_label"]
                        }))?,
                        annotations: None,
                    },
                ];
                let result = ListToolsResult {
                    tools,
                    next_cursor: None,
                };
                serde_json::to_value(result)
                    .map_err(|e| Error::protocol(ErrorCode::InternalError, e.to_string()))
            }
            "tools/call" => {
                let req: CallToolRequest = params
                    .and_then(|v| serde_json::from_value(v).ok())
                    .ok_or(Error::protocol(ErrorCode::InvalidParams, "Missing params"))?;

                let text = match req.name.as_str() {
                    "get_config" => self.config_text(),
                    "get_gene_specificity" => self.specificity_text(parse_args(req.arguments)?)?,
                    "get_psi_block" => self.psi_block_text(parse_args(req.arguments)?)?,
                    "get_gene_expression" => self.expression_text(parse_args(req.arguments)?)?,
                    "get_marker_genes" => self.marker_text(parse_args(req.arguments)?)?,
                    "get_housekeeping_genes" => self.housekeeping_text(parse_args(req.arguments)?)?,
                    "get_highly_specific_genes" => {
                        self.highly_specific_text(parse_args(req.arguments)?)?
                    }
                    _ => return Err(Error::protocol(ErrorCode::MethodNotFound, req.name)),
                };

                let result = ToolResult {
                    content: Vec::new(),
                    structured_content: Some(
                        serde_json::to_value(vec![serde_json::json!({
                            "type": "text",
                            "text": text
                        })])
                        .unwrap(),
                    ),
                };
                serde_json::to_value(result)
                    .map_err(|e| Error::protocol(ErrorCode::InternalError, e.to_string()))
            }
            _ => Err(Error::protocol(
                ErrorCode::MethodNotFound,
                method.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_args_require_the_vocabulary_triple() {
        let parsed: Result<MarkerArgs, _> = parse_args(Some(serde_json::json!({
            "analysis_level": "tissue",
            "analysis_type": "global",
            "block_label": "liver"
        })));
        assert!(parsed.is_ok());

        let missing: Result<MarkerArgs, _> = parse_args(Some(serde_json::json!({
            "analysis_level": "tissue",
            "analysis_type": "global"
        })));
        assert!(missing.is_err());
    }

    #[test]
    fn specificity_args_accept_optional_level_and_type() {
        let parsed: SpecificityArgs = parse_args(Some(serde_json::json!({
            "gene_list": ["Alb", "Gapdh"]
        })))
        .unwrap();
        assert_eq!(parsed.gene_list.len(), 2);
        assert!(parsed.analysis_level.is_none());

        let missing: Result<SpecificityArgs, _> = parse_args(Some(serde_json::json!({})));
        assert!(missing.is_err());
    }

    #[test]
    fn render_rows_caps_output() {
        let mut table = ResultTable::new(["gene_name"]);
        for i in 0..60 {
            table.push_row(vec![format!("gene{i}").into()]);
        }
        let text = render_rows(&table);
        assert!(text.contains("... 50 of 60 rows shown"));
        assert_eq!(text.lines().count(), 52);
    }

    #[test]
    fn gene_list_text_caps_at_twenty() {
        let mut table = ResultTable::new(["gene_name", "psi_mean"]);
        for i in 0..25 {
            table.push_row(vec![format!("gene{i:02}").into(), 0.05.into()]);
        }
        let text = gene_list_text(&table);
        assert!(text.contains("gene00 (psi_mean=0.050)"));
        assert!(text.contains("... and 5 more"));
    }

    #[test]
    fn psi_block_charts_group_and_rank_blocks() {
        let mut table = ResultTable::new(["gene_name", "block_label", "psi_block"]);
        table.push_row(vec!["Alb".into(), "heart".into(), 0.02.into()]);
        table.push_row(vec!["Alb".into(), "liver".into(), 0.85.into()]);
        table.push_row(vec!["Gapdh".into(), "liver".into(), 0.04.into()]);
        let text = psi_block_charts(&table);
        let liver_pos = text.find("liver").unwrap();
        let heart_pos = text.find("heart").unwrap();
        assert!(liver_pos < heart_pos, "largest contribution listed first");
        assert!(text.contains('█'));
        assert!(text.contains("Gapdh:"));
    }

    #[test]
    fn engine_errors_split_request_from_internal() {
        assert!(matches!(
            error_code_for(&crate::Error::UnknownLevel("x".into())),
            ErrorCode::InvalidParams
        ));
        assert!(matches!(
            error_code_for(&crate::Error::InvalidThreshold {
                name: "psi",
                value: 2.0
            }),
            ErrorCode::InvalidParams
        ));
        assert!(matches!(
            error_code_for(&crate::Error::StoreUnavailable("8cube.db".into())),
            ErrorCode::InternalError
        ));
    }
}
