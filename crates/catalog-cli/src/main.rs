use anyhow::{anyhow, Result};
use catalog_core::{validate, SearchQuery, SimilarityParams, SortOrder};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about="Catalog search query compiler", long_about=None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compile querystring parameters (key=value pairs) into the
    /// Elasticsearch request body and print it.
    Compile {
        params: Vec<String>,
    },
    /// Compile a vector-similarity query and print it.
    Similar {
        /// Comma-separated query vector, e.g. "0.12,0.03,0.88"
        #[arg(long)]
        vector: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        #[arg(long)]
        sort_by: Option<String>,
        /// Comma-separated _source projection
        #[arg(long)]
        fields: Option<String>,
    },
}

fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut raw = BTreeMap::new();
    for pair in pairs {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", pair))?;
        raw.insert(k.to_string(), v.to_string());
    }
    Ok(raw)
}

fn parse_vector(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("bad vector component '{}'", p))
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sq = match cli.cmd {
        Cmd::Compile { params } => {
            let raw = parse_pairs(&params)?;
            let spec = validate(&raw)?;
            SearchQuery::matching(&spec)?
        }
        Cmd::Similar {
            vector,
            page,
            page_size,
            sort_by,
            fields,
        } => {
            let params = SimilarityParams {
                vector: parse_vector(&vector)?,
                page,
                page_size,
                fields: fields.map(|f| f.split(',').map(str::to_string).collect()),
                sort_by,
                sort_order: SortOrder::Asc,
            }
            .normalized()?;
            SearchQuery::similarity(&params)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&sq.body)?);
    Ok(())
}
