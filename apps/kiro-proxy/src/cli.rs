use std::path::PathBuf;

use clap::Parser;

/// kiro-proxy: a multi-account reverse proxy fronting one upstream with
/// Anthropic, OpenAI, and Gemini dialects.
#[derive(Debug, Parser)]
#[command(name = "kiro-proxy", version, about)]
pub struct Cli {
    /// Path to the TOML config file (identity pool, bind address, timeouts).
    #[arg(long, short = 'c', default_value = "kiro-proxy.toml")]
    pub config: PathBuf,
}
