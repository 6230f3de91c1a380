//! sbx-query: run a model query from the command line.
//!
//! Usage:
//!   sbx-query Product --where sku=A1 --fetch customer --all

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sbx_client::{ClientConfig, FetchSpec, Outcome, SbxClient};

/// Query an SBX Cloud model and print the reply as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to query.
    model: String,

    /// Equality condition, FIELD=VALUE (repeatable).
    #[arg(long = "where", value_name = "FIELD=VALUE")]
    conditions: Vec<String>,

    /// Reference field to fetch and map, dotted for nested (repeatable).
    #[arg(long = "fetch", value_name = "PATH")]
    fetch: Vec<String>,

    /// Page to fetch (ignored with --all).
    #[arg(long, default_value = "1")]
    page: u32,

    /// Page size (ignored with --all).
    #[arg(long)]
    page_size: Option<u32>,

    /// Fetch every page.
    #[arg(long, conflicts_with = "delete")]
    all: bool,

    /// Delete the matching rows instead of listing them.
    #[arg(long)]
    delete: bool,

    /// Bearer token for user-scoped requests.
    #[arg(long, env = "SBX_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let config = ClientConfig::from_env().context("failed to load configuration")?;
    let client = SbxClient::new(&config).context("failed to create client")?;
    if let Some(token) = &args.token {
        client.set_token(token).context("invalid token")?;
    }

    let to_fetch: FetchSpec = args.fetch.iter().map(String::as_str).collect();

    let mut session = client.with(&args.model);
    {
        let query = session.query();
        for condition in &args.conditions {
            let (field, value) = parse_condition(condition)?;
            query.and_where_is_equal(field, value);
        }
        query.fetch_models(to_fetch.roots()).set_page(args.page);
        if let Some(size) = args.page_size {
            query.set_page_size(size);
        }
    }

    info!(model = %args.model, all = args.all, delete = args.delete, "running query");

    if args.delete {
        print_outcome(&session.delete().await?)
    } else if args.all {
        print_outcome(&session.load_all(&to_fetch).await?)
    } else {
        print_outcome(&session.find(&to_fetch).await?)
    }
}

fn parse_condition(raw: &str) -> Result<(&str, &str)> {
    let (field, value) = raw
        .split_once('=')
        .with_context(|| format!("condition '{raw}' must look like FIELD=VALUE"))?;
    if field.is_empty() {
        anyhow::bail!("condition '{raw}' has an empty field name");
    }
    Ok((field, value))
}

fn print_outcome<T: Serialize>(outcome: &Outcome<T>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(outcome).context("failed to render reply")?;
    println!("{rendered}");

    if let Outcome::Failure(failure) = outcome {
        anyhow::bail!("server refused the query: {failure}");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
