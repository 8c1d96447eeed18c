use std::time::Duration;

use anyhow::Context;
use clap::Args;

pub const DEFAULT_POLL_SECS: u64 = 30;

/// Connection and polling options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Postgres connection string of the observation store
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Schema holding the observation tables and views
    #[arg(long, env = "OBSERVATION_SCHEMA", default_value = "public", global = true)]
    pub schema: String,

    #[arg(long, default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Seconds between freshness checks in watch mode
    #[arg(long, env = "OBSERVATION_POLL_SECS", default_value_t = DEFAULT_POLL_SECS, global = true)]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub max_connections: u32,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_args(args: &StoreArgs) -> anyhow::Result<Self> {
        let database_url = args
            .database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL must be set to the observation store's Postgres instance")?;

        if !is_identifier(&args.schema) {
            anyhow::bail!("invalid schema name: {:?}", args.schema);
        }

        Ok(Self {
            database_url,
            schema: args.schema.clone(),
            max_connections: args.max_connections.max(1),
            poll_interval: Duration::from_secs(args.poll_interval_secs.max(1)),
        })
    }
}

// The schema is spliced into SQL text, so only plain identifiers are accepted.
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
