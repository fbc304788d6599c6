use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

use crate::generate::PipelineInfo;
use crate::progress::PollPolicy;

/// Lowest accepted progress poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Hosted database row API
    Rest,
    /// Process-local tables, lost on exit
    Memory,
}

/// Command-line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "report-portal", version, about = "Research report portal API")]
pub struct Settings {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: Option<String>,

    #[arg(long, env = "BACKEND_API_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,

    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 30)]
    pub backend_timeout_secs: u64,

    /// Model name recorded in report snapshots
    #[arg(long, env = "LLM_PROVIDER", default_value = "gemini")]
    pub llm_provider: String,

    #[arg(long, env = "PIPELINE_VERSION", default_value = "1.0.0")]
    pub pipeline_version: String,

    /// Progress poll interval in milliseconds (at least 250)
    #[arg(
        long,
        env = "POLL_INTERVAL_MS",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(MIN_POLL_INTERVAL_MS..)
    )]
    pub poll_interval_ms: u64,

    /// Stop following a report after this many seconds (unbounded if unset)
    #[arg(long, env = "POLL_TIMEOUT_SECS")]
    pub poll_timeout_secs: Option<u64>,

    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreKind::Rest)]
    pub store: StoreKind,
}

impl Settings {
    /// Hosted project URL and anon key, both required to run.
    pub fn supabase(&self) -> Result<(&str, &str)> {
        match (self.supabase_url.as_deref(), self.supabase_anon_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Ok((url, key)),
            _ => bail!("Supabase not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY."),
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn pipeline(&self) -> PipelineInfo {
        PipelineInfo {
            llm_model: self.llm_provider.clone(),
            pipeline_version: self.pipeline_version.clone(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS)),
            timeout: self.poll_timeout_secs.map(Duration::from_secs),
        }
    }
}
