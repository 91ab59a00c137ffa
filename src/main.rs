//! cubedb CLI - query tool and servers for the 8cube specificity stores

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cubedb::config::{self, CubedbConfig, Thresholds};
use cubedb::query::{ClassificationEngine, ExpressionEngine, QueryEngine};
use cubedb::server::{csv, mcp::McpService, start_server};
use cubedb::storage::{DbStats, ExpressionStore, SpecificityStore};
use cubedb::table::ResultTable;
use cubedb::ui;
use cubedb::vocab::ConfigVocabulary;
use cubedb::GeneSelection;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cubedb")]
#[command(version = "0.1.0")]
#[command(about = "Gene specificity queries over the 8cube founder-mouse dataset")]
#[command(long_about = r#"
cubedb answers gene specificity questions against the 8cube SQLite
stores:
  • Global specificity (psi) and reproducibility (zeta) per gene
  • Per-block psi decomposition for any analysis level/type
  • Highly specific, housekeeping and marker gene classification
  • Expression mean/variance summaries

Example usage:
  cubedb config
  cubedb specificity Alb Gapdh --analysis-level tissue --analysis-type global
  cubedb marker --analysis-level tissue --analysis-type global --block-label liver
  cubedb serve --port 8000
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: cubedb.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the specificity store (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the expression store (overrides config)
    #[arg(short = 'e', long, global = true)]
    expression_database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file with the default paths and cutoffs
    Init {
        /// Where to write the config
        #[arg(short, long, default_value = "cubedb.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the analysis levels, types and block labels in the store
    Config,

    /// Global specificity (psi/zeta) for genes
    Specificity {
        /// Gene names or Ensembl ids (empty = all genes)
        gene_list: Vec<String>,

        /// Analysis level (e.g. tissue)
        #[arg(short = 'l', long)]
        analysis_level: Option<String>,

        /// Analysis type within the level (e.g. global)
        #[arg(short = 't', long)]
        analysis_type: Option<String>,

        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Per-block psi decomposition for an analysis level/type
    PsiBlock {
        /// Gene names or Ensembl ids (empty = all genes)
        gene_list: Vec<String>,

        #[arg(short = 'l', long)]
        analysis_level: String,

        #[arg(short = 't', long)]
        analysis_type: String,

        /// Restrict to one block
        #[arg(short, long)]
        block_label: Option<String>,

        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Genes with high block-local psi for one block
    HighlySpecific {
        #[arg(short = 'l', long)]
        analysis_level: String,

        #[arg(short = 't', long)]
        analysis_type: String,

        #[arg(short, long)]
        block_label: String,

        /// Block-local psi cutoff (default from config)
        #[arg(long)]
        psi_block_cutoff: Option<f64>,

        /// Keep only the top K genes by contribution
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Housekeeping genes: global psi below the cutoff
    Housekeeping {
        #[arg(short = 'l', long)]
        analysis_level: String,

        #[arg(short = 't', long)]
        analysis_type: String,

        /// Global psi ceiling (default from config)
        #[arg(long)]
        psi_cutoff: Option<f64>,

        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Marker genes: high block-local psi AND high global psi
    Marker {
        #[arg(short = 'l', long)]
        analysis_level: String,

        #[arg(short = 't', long)]
        analysis_type: String,

        #[arg(short, long)]
        block_label: String,

        /// Block-local psi cutoff (default from config)
        #[arg(long)]
        psi_block_cutoff: Option<f64>,

        /// Global psi cutoff (default from config)
        #[arg(long)]
        psi_cutoff: Option<f64>,

        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Expression mean/variance for genes
    Expression {
        /// Gene names or Ensembl ids (empty = all genes)
        gene_list: Vec<String>,

        /// Restrict to specific conditions (repeatable)
        #[arg(short = 'C', long = "condition")]
        conditions: Vec<String>,

        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Row counts for both stores
    Stats,

    /// Run the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Run the MCP server on stdio
    Mcp,
}

/// Paths and cutoffs after flag > config file > default resolution.
struct Settings {
    database: PathBuf,
    expression_database: PathBuf,
    thresholds: Thresholds,
}

fn resolve_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let file = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    Ok(Settings {
        database: cli.database.clone().unwrap_or_else(|| file.database_path()),
        expression_database: cli
            .expression_database
            .clone()
            .unwrap_or_else(|| file.expression_database_path()),
        thresholds: file.thresholds(),
    })
}

fn open_with_vocab(settings: &Settings) -> anyhow::Result<(SpecificityStore, ConfigVocabulary)> {
    let store = SpecificityStore::open(&settings.database)?;
    let vocab = ConfigVocabulary::discover(&store)?;
    Ok((store, vocab))
}

fn print_table(table: &ResultTable, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&table.to_records())?),
        "csv" => print!("{}", csv::encode(table)),
        _ => {
            if table.is_empty() {
                println!("{}", ui::dim("(no rows)"));
            } else {
                println!("{}", ui::render_table(table));
                ui::summary_row("rows:", &table.len().to_string());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = resolve_settings(&cli)?;

    if let Err(err) = run(cli.command, settings).await {
        ui::error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, settings: Settings) -> anyhow::Result<()> {
    match command {
        Commands::Init { path, force } => {
            let starter = CubedbConfig {
                database: Some(config::default_database_path().display().to_string()),
                expression_database: Some(
                    config::default_expression_database_path().display().to_string(),
                ),
                thresholds: Some(Thresholds::default()),
            };
            config::write_config(&path, &starter, force)?;
            ui::success(&format!("wrote {}", path.display()));
        }

        Commands::Config => {
            let (_store, vocab) = open_with_vocab(&settings)?;
            ui::header("8cube analysis vocabulary");
            ui::info("store", &settings.database.display().to_string());
            if vocab.is_empty() {
                ui::warn("store contains no analysis levels");
            }
            for level in vocab.levels() {
                ui::section(level);
                for analysis_type in vocab.types(level) {
                    let blocks = vocab.blocks(level, analysis_type);
                    ui::summary_row(
                        &format!("{analysis_type} ({} blocks):", blocks.len()),
                        &blocks.join(", "),
                    );
                }
            }
        }

        Commands::Specificity {
            gene_list,
            analysis_level,
            analysis_type,
            format,
        } => {
            let (store, vocab) = open_with_vocab(&settings)?;
            let engine = QueryEngine::new(&store, &vocab);
            let selection = GeneSelection::from_ids(gene_list);
            let table = match (analysis_level, analysis_type) {
                (Some(level), Some(analysis_type)) => {
                    engine.get_specificity(&selection, &level, &analysis_type)?
                }
                (None, None) => engine.get_specificity_profile(&selection)?,
                _ => anyhow::bail!("--analysis-level and --analysis-type must be used together"),
            };
            print_table(&table, &format)?;
        }

        Commands::PsiBlock {
            gene_list,
            analysis_level,
            analysis_type,
            block_label,
            format,
        } => {
            let (store, vocab) = open_with_vocab(&settings)?;
            let engine = QueryEngine::new(&store, &vocab);
            let selection = GeneSelection::from_ids(gene_list);
            let table = engine.get_psi_block(
                &selection,
                &analysis_level,
                &analysis_type,
                block_label.as_deref(),
            )?;
            print_table(&table, &format)?;
        }

        Commands::HighlySpecific {
            analysis_level,
            analysis_type,
            block_label,
            psi_block_cutoff,
            top_k,
            format,
        } => {
            let (store, vocab) = open_with_vocab(&settings)?;
            let engine = ClassificationEngine::new(&store, &vocab);
            let cutoff = psi_block_cutoff.unwrap_or(settings.thresholds.block_psi);
            let table =
                engine.highly_specific(&analysis_level, &analysis_type, &block_label, cutoff, top_k)?;
            ui::status(
                ui::Icons::SEARCH,
                "highly specific",
                &format!("{analysis_level}/{analysis_type} block '{block_label}' psi_block > {cutoff}"),
            );
            print_table(&table, &format)?;
        }

        Commands::Housekeeping {
            analysis_level,
            analysis_type,
            psi_cutoff,
            format,
        } => {
            let (store, vocab) = open_with_vocab(&settings)?;
            let engine = ClassificationEngine::new(&store, &vocab);
            let cutoff = psi_cutoff.unwrap_or(settings.thresholds.housekeeping_psi);
            let table = engine.non_specific(&analysis_level, &analysis_type, cutoff)?;
            ui::status(
                ui::Icons::SEARCH,
                "housekeeping",
                &format!("{analysis_level}/{analysis_type} psi_mean < {cutoff}"),
            );
            print_table(&table, &format)?;
        }

        Commands::Marker {
            analysis_level,
            analysis_type,
            block_label,
            psi_block_cutoff,
            psi_cutoff,
            format,
        } => {
            let (store, vocab) = open_with_vocab(&settings)?;
            let engine = ClassificationEngine::new(&store, &vocab);
            let block_cutoff = psi_block_cutoff.unwrap_or(settings.thresholds.block_psi);
            let global_cutoff = psi_cutoff.unwrap_or(settings.thresholds.global_psi);
            let table = engine.marker(
                &analysis_level,
                &analysis_type,
                &block_label,
                block_cutoff,
                global_cutoff,
            )?;
            ui::status(
                ui::Icons::STAR,
                "markers",
                &format!(
                    "{analysis_level}/{analysis_type} block '{block_label}' psi_block > {block_cutoff}, psi_mean > {global_cutoff}"
                ),
            );
            print_table(&table, &format)?;
        }

        Commands::Expression {
            gene_list,
            conditions,
            format,
        } => {
            let store = ExpressionStore::open(&settings.expression_database)?;
            let engine = ExpressionEngine::new(&store);
            let selection = GeneSelection::from_ids(gene_list);
            let table = engine.get_expression(&selection, &conditions)?;
            print_table(&table, &format)?;
            let missing = ExpressionEngine::missing_genes(&selection, &table);
            if !missing.is_empty() {
                ui::warn(&format!("no expression data for: {}", missing.join(", ")));
            }
        }

        Commands::Stats => {
            let store = SpecificityStore::open(&settings.database)?;
            let expression = ExpressionStore::open(&settings.expression_database)?;
            let stats = DbStats {
                specificity_rows: store.count_specificity()?,
                psi_block_rows: store.count_psi_block()?,
                expression_rows: expression.count_expression()?,
            };
            ui::status(
                ui::Icons::STATS,
                "stores",
                &format!(
                    "{} / {}",
                    settings.database.display(),
                    settings.expression_database.display()
                ),
            );
            println!(
                "{}",
                ui::stats_table(&[
                    ("specificity rows", stats.specificity_rows.to_string()),
                    ("psi_block rows", stats.psi_block_rows.to_string()),
                    ("expression rows", stats.expression_rows.to_string()),
                ])
            );
        }

        Commands::Serve { port } => {
            start_server(
                port,
                settings.database,
                settings.expression_database,
                settings.thresholds,
            )
            .await?;
        }

        Commands::Mcp => {
            let store = SpecificityStore::open(&settings.database)?;
            let vocab = ConfigVocabulary::discover(&store)?;
            drop(store);
            let service = McpService::new(
                settings.database,
                settings.expression_database,
                vocab,
                settings.thresholds,
            );
            service.run_stdio().await?;
        }
    }

    Ok(())
}
