//! Load every model once and report which domains are degraded

use super::ModelArgs;
use anyhow::{Context as _, Result};
use clap::Args;
use prismatic_core::{ClassificationPipeline, DatasetDomain, PipelineError};
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

#[derive(Args)]
pub struct VerifyCommand {
    #[command(flatten)]
    model: ModelArgs,

    /// Exit successfully when only some experts are missing
    #[arg(long)]
    allow_degraded: bool,
}

impl VerifyCommand {
    pub async fn execute(self) -> Result<()> {
        let config = self.model.load_config()?;
        let allow_degraded = self.allow_degraded;

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let pipeline = ClassificationPipeline::from_config(&config)
                .context("Failed to initialize classification pipeline")?;
            let cache = pipeline.cache();

            let router_ok = match cache.get_router() {
                Ok(router) => {
                    println!(
                        "router          ok        loaded in {:.3}s",
                        router.load_time().as_secs_f64()
                    );
                    true
                }
                Err(e) => {
                    println!("router          FAILED    {}", e);
                    false
                }
            };

            // Experts load independently, so load them in parallel
            let results: Vec<(DatasetDomain, Result<f64, PipelineError>)> = DatasetDomain::ALL
                .par_iter()
                .map(|&domain| {
                    let outcome = cache
                        .get_expert(domain)
                        .map(|handle| handle.load_time().as_secs_f64());
                    (domain, outcome)
                })
                .collect();

            let mut missing = 0;
            let mut broken = 0;
            for (domain, outcome) in &results {
                match outcome {
                    Ok(secs) => {
                        println!("{:<15} ok        loaded in {:.3}s", domain.as_str(), secs)
                    }
                    Err(e @ PipelineError::ModelNotFound { .. }) => {
                        missing += 1;
                        println!("{:<15} MISSING   {}", domain.as_str(), e);
                    }
                    Err(e) => {
                        broken += 1;
                        println!("{:<15} FAILED    {}", domain.as_str(), e);
                    }
                }
            }

            let stats = cache.stats();
            info!(
                "Verified {} model(s) in {:.2}s",
                stats.loads,
                start.elapsed().as_secs_f64()
            );

            if !router_ok {
                anyhow::bail!("router model is unavailable");
            }
            if broken > 0 {
                anyhow::bail!("{} expert model(s) failed to load", broken);
            }
            if missing > 0 && !allow_degraded {
                anyhow::bail!(
                    "{} domain(s) have no expert model (use --allow-degraded to accept)",
                    missing
                );
            }
            Ok(())
        })
        .await
        .context("Verification task failed")?
    }
}
