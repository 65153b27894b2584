//! Domain listing command

use super::ModelArgs;
use anyhow::Result;
use clap::Args;
use prismatic_core::DatasetDomain;

#[derive(Args)]
pub struct DomainsCommand {
    #[command(flatten)]
    model: ModelArgs,
}

impl DomainsCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.model.load_config()?;
        let layout = config.layout()?;

        let router_path = layout.router_path();
        println!(
            "Router: {} ({})",
            router_path.display(),
            if router_path.is_file() { "present" } else { "missing" }
        );
        println!("\nDomains (router output order):");

        for domain in DatasetDomain::ALL {
            let path = layout.expert_path(domain);
            println!(
                "  {:>2}  {:<15} {:<32} {}",
                domain.index(),
                domain.as_str(),
                domain.description(),
                if path.is_file() { "deployed" } else { "missing" }
            );
        }

        Ok(())
    }
}
