//! Resolves loans from a JSON file (array of loans) and prints the outcomes.
//!
//! Usage: `cargo run --bin resolve_once -- loans.json`

use anyhow::{Context, Result};
use content_resolver::bootstrap::Runtime;
use content_resolver::types::Loan;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let path = std::env::args()
        .nth(1)
        .context("usage: resolve_once <loans.json>")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let loans: Vec<Loan> = serde_json::from_str(&raw).context("parsing loans")?;

    let rt = Runtime::from_default_config()?;
    let results = rt.orchestrator.resolve_many(loans).await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    let found = results.iter().filter(|r| r.is_found()).count();
    eprintln!("resolved {found}/{}", results.len());
    Ok(())
}
