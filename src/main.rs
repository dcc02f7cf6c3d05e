use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};

use marketscope::analysis::{AnalysisRequest, MarketAnalysisAggregator};
use marketscope::api::{HttpMarketplaceApi, MarketplaceApi};
use marketscope::catalog::CatalogTaxonomy;
use marketscope::error::classify;
use marketscope::integrity::{IntegrityValidator, MemoryStorage};
use marketscope::logging::{init_logging, LoggingConfig};
use marketscope::orchestrator::{OrchestratorConfig, ValidationOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "marketscope")]
#[command(version)]
#[command(about = "Resilient marketplace price analysis and validation")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one product: resolve its brand, ingest sold listings, and
    /// print price statistics as JSON
    Analyze {
        /// Free-text product name, e.g. "iphone 14 pro"
        product: String,

        /// Leaf (level-3) catalog id to search in
        #[arg(long)]
        catalog_id: u32,

        /// API access token; falls back to MARKETSCOPE_TOKEN
        #[arg(long)]
        token: Option<String>,

        /// Maximum listing pages to fetch
        #[arg(long, default_value = "5")]
        pages: u32,
    },

    /// Run the complete validation sequence and print the report as JSON
    Validate {
        /// API access token; falls back to MARKETSCOPE_TOKEN
        #[arg(long)]
        token: Option<String>,

        /// Minimum pass ratio for overall success
        #[arg(long, default_value = "0.8")]
        pass_threshold: f64,
    },

    /// Search the category taxonomy
    Categories {
        /// Query text; exact, fuzzy, and popular matches are printed
        query: String,
    },
}

fn resolve_token(flag: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var("MARKETSCOPE_TOKEN").ok())
        .filter(|t| !t.trim().is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose));

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Analyze {
            product,
            catalog_id,
            token,
            pages,
        } => {
            let token = resolve_token(token)
                .ok_or("no access token; pass --token or set MARKETSCOPE_TOKEN")?;
            let api = Arc::new(HttpMarketplaceApi::new().map_err(|e| e.to_string())?);
            let catalog = Arc::new(CatalogTaxonomy::builtin());
            let aggregator =
                MarketAnalysisAggregator::new(api, catalog).with_page_limit(pages);

            let request = AnalysisRequest {
                product_name: product,
                catalog_id,
            };
            let result = aggregator
                .analyze_product(&request, &token)
                .await
                .map_err(|e| classify(&e).to_string())?;
            print_json(&result)
        }

        Command::Validate {
            token,
            pass_threshold,
        } => {
            let token = resolve_token(token);
            let api: Arc<dyn MarketplaceApi> =
                Arc::new(HttpMarketplaceApi::new().map_err(|e| e.to_string())?);
            let catalog = Arc::new(CatalogTaxonomy::builtin());
            let aggregator = MarketAnalysisAggregator::new(Arc::clone(&api), catalog);
            let storage = Arc::new(MemoryStorage::new());
            storage.seed_task("validation-probe");
            let integrity = IntegrityValidator::new(storage);

            let config = OrchestratorConfig {
                pass_threshold,
                ..OrchestratorConfig::default()
            };
            let mut orchestrator = ValidationOrchestrator::new(api, aggregator, integrity, config);
            let report = orchestrator
                .execute_complete_validation(token.as_deref())
                .await;
            print_json(&report)?;
            if report.overall_success {
                Ok(())
            } else {
                Err("validation did not pass".to_string())
            }
        }

        Command::Categories { query } => {
            let catalog = CatalogTaxonomy::builtin();
            print_json(&catalog.smart_search(&query))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to render output: {e}"))?;
    println!("{rendered}");
    Ok(())
}
