use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indexadvisor_core::{AdvisorConfig, Column, ExtendAlgorithm, Index, InMemoryWhatIfConnector, Workload};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "indexadvisor")]
#[command(version)]
#[command(about = "Heuristic automated index advisor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend an index combination for a workload
    Recommend {
        /// Workload JSON file (a `Workload` value: `{"queries": [...]}`)
        #[arg(short, long)]
        workload: PathBuf,
        /// Flat advisor configuration JSON file (object of key -> value)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// What-if connector fixture JSON file supplying deterministic costs/sizes
        #[arg(short, long)]
        fixture: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Explain which simulated indexes a single query's plan actually used
    Explain {
        /// Workload JSON file; the first query is used
        #[arg(short, long)]
        workload: PathBuf,
        /// What-if connector fixture JSON file
        #[arg(short, long)]
        fixture: PathBuf,
        /// Candidate index, e.g. `orders.customer_id,order_date`
        #[arg(short, long)]
        index: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("indexadvisor=info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Recommend {
            workload,
            config,
            fixture,
            format,
        } => run_recommend(&workload, config.as_deref(), &fixture, format),
        Commands::Explain {
            workload,
            fixture,
            index,
        } => run_explain(&workload, &fixture, &index),
    }
}

fn run_recommend(workload_path: &PathBuf, config_path: Option<&std::path::Path>, fixture_path: &PathBuf, format: OutputFormat) -> Result<()> {
    let workload = load_workload(workload_path)?;
    let config = match config_path {
        Some(path) => {
            let map = load_flat_config(path)?;
            AdvisorConfig::from_map(&map).context("Failed to build advisor configuration")?
        }
        None => AdvisorConfig::default(),
    };
    let connector = load_fixture(fixture_path)?;

    let mut algorithm = ExtendAlgorithm::new(connector, config);
    let combination = algorithm
        .recommend(&workload)
        .context("Failed to run index selection")?;
    algorithm.complete().context("Failed to release simulated indexes")?;

    match format {
        OutputFormat::Text => {
            if combination.is_empty() {
                println!("No indexes recommended.");
            } else {
                for index in combination.indexes() {
                    println!("{}", index);
                }
            }
        }
        OutputFormat::Json => {
            let names: Vec<String> = combination.indexes().iter().map(|i| i.to_string()).collect();
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
    }

    Ok(())
}

fn run_explain(workload_path: &PathBuf, fixture_path: &PathBuf, index_spec: &str) -> Result<()> {
    let workload = load_workload(workload_path)?;
    let query = workload
        .queries
        .first()
        .ok_or_else(|| anyhow!("workload file contains no queries"))?;
    let index = parse_index_spec(index_spec)?;
    let connector = load_fixture(fixture_path)?;

    let mut evaluator = indexadvisor_core::CostEvaluation::new(connector);
    let combination = indexadvisor_core::IndexCombination::from_vec(vec![index]);
    let (used, cost) = evaluator
        .which_indexes_utilized_and_cost(query, &combination)
        .context("Failed to evaluate candidate index")?;
    evaluator.complete().context("Failed to release simulated indexes")?;

    println!("cost: {cost:.2}");
    if used.is_empty() {
        println!("no simulated index was used by the plan");
    } else {
        for index in used.iter() {
            println!("used: {index}");
        }
    }

    Ok(())
}

fn load_workload(path: &PathBuf) -> Result<Workload> {
    let content = fs::read_to_string(path).context("Failed to read workload file")?;
    serde_json::from_str(&content).context("Failed to parse workload file")
}

fn load_flat_config(path: &std::path::Path) -> Result<HashMap<String, serde_json::Value>> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    serde_json::from_str(&content).context("Failed to parse config file")
}

/// The fixture file format: fixed costs/sizes for a deterministic in-memory connector.
///
/// There is no live database in this crate's scope, so every CLI run is
/// driven against canned what-if responses rather than a real optimizer.
#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    default_cost: Option<f64>,
    #[serde(default)]
    default_size_mb: Option<f64>,
    #[serde(default)]
    costs: Vec<CostEntry>,
    #[serde(default)]
    sizes: Vec<SizeEntry>,
}

#[derive(Deserialize)]
struct CostEntry {
    query_id: String,
    /// Index specs simulated when this cost applies, e.g. `["orders.customer_id"]`.
    indexes: Vec<String>,
    cost: f64,
}

#[derive(Deserialize)]
struct SizeEntry {
    index: String,
    size_mb: f64,
}

fn load_fixture(path: &PathBuf) -> Result<InMemoryWhatIfConnector> {
    let content = fs::read_to_string(path).context("Failed to read fixture file")?;
    let fixture: Fixture = serde_json::from_str(&content).context("Failed to parse fixture file")?;

    let mut connector = InMemoryWhatIfConnector::new();
    if let Some(cost) = fixture.default_cost {
        connector = connector.with_default_cost(cost);
    }
    if let Some(size_mb) = fixture.default_size_mb {
        let size_bytes = (size_mb * indexadvisor_core::units::BYTES_PER_MB as f64).round() as u64;
        connector = connector.with_default_size_bytes(size_bytes);
    }

    for entry in &fixture.sizes {
        let index = parse_index_spec(&entry.index)?;
        let size_bytes = (entry.size_mb * indexadvisor_core::units::BYTES_PER_MB as f64).round() as u64;
        connector.set_size(&index, size_bytes);
    }

    for entry in &fixture.costs {
        let indexes: Result<Vec<Index>> = entry.indexes.iter().map(|spec| parse_index_spec(spec)).collect();
        let indexes = indexes?;
        let refs: Vec<&Index> = indexes.iter().collect();
        connector.set_cost(&entry.query_id, &refs, entry.cost);
    }

    Ok(connector)
}

/// Parse `table.col1,col2` into an [`Index`], the same shape used by `explain --index`.
fn parse_index_spec(spec: &str) -> Result<Index> {
    let (table, columns) = spec
        .split_once('.')
        .ok_or_else(|| anyhow!("index spec `{spec}` must be of the form table.col1,col2"))?;
    let columns: Vec<Column> = columns.split(',').map(|name| Column::new(table, name.trim())).collect();
    Ok(Index::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_multi_column_index_spec() {
        let index = parse_index_spec("orders.customer_id,order_date").unwrap();
        assert_eq!(index.columns().len(), 2);
        assert_eq!(index.table(), "orders");
    }

    #[test]
    fn rejects_spec_without_a_table_separator() {
        assert!(parse_index_spec("customer_id").is_err());
    }

    fn write_temp_json(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn load_workload_reads_and_parses_a_workload_file() {
        let (_dir, path) = write_temp_json(
            r#"{"queries": [{"id": "q1", "text": "select 1", "columns": [], "frequency": 1.0}]}"#,
        );
        let workload = load_workload(&path).unwrap();
        assert_eq!(workload.queries.len(), 1);
        assert_eq!(workload.queries[0].id, "q1");
    }

    #[test]
    fn load_flat_config_reads_a_config_file_into_advisorconfig() {
        let (_dir, path) = write_temp_json(r#"{"budget_mb": 42}"#);
        let map = load_flat_config(&path).unwrap();
        let config = AdvisorConfig::from_map(&map).unwrap();
        assert_eq!(config.budget_mb, 42);
    }

    #[test]
    fn load_fixture_wires_default_size_into_the_connector() {
        use indexadvisor_core::DatabaseConnector;

        let (_dir, path) = write_temp_json(r#"{"default_cost": 10.0, "default_size_mb": 2.0}"#);
        let mut connector = load_fixture(&path).unwrap();
        let index = Index::new(vec![Column::new("orders", "id")]).unwrap();
        let (oid, _) = connector.simulate_index(&index).unwrap();
        assert_eq!(connector.estimate_index_size(oid).unwrap(), 2_000_000);
    }
}
