//! `introute template` — Inspect, validate, and import templates.

use clap::Subcommand;
use introute_config::EngineConfig;
use introute_core::error::StoreError;
use introute_core::scenario::{IssueSeverity, Template};

use crate::wiring;

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Validate a template's configuration
    Check {
        /// Template id
        #[arg(short, long)]
        template: String,
    },

    /// Show learning statistics and budget state
    Stats {
        /// Template id
        #[arg(short, long)]
        template: String,
    },

    /// Import a template from a JSON file
    Import {
        /// Path to the template JSON document
        #[arg(short, long)]
        file: String,
    },
}

pub async fn run(command: TemplateCommand) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (scenarios, _suggestions) = wiring::open_stores(&config).await?;

    match command {
        TemplateCommand::Check { template } => {
            let t = scenarios.find(&template).await?;
            let issues = t.validate();
            if issues.is_empty() {
                println!("Template '{}' is valid.", t.id);
            } else {
                println!("Template '{}' has {} issue(s):", t.id, issues.len());
                for issue in issues {
                    let tag = match issue.severity {
                        IssueSeverity::Critical => "CRITICAL",
                        IssueSeverity::Warning => "warning",
                    };
                    println!("  [{tag}] {}", issue.message);
                }
            }
        }

        TemplateCommand::Stats { template } => {
            let t = scenarios.find(&template).await?;
            println!("Template:   {} ({})", t.name, t.id);
            println!("Scenarios:  {} active", t.active_scenarios().len());
            println!("Synonyms:   {} terms", t.synonyms.len());
            println!("Fillers:    {} words", t.fillers.len());
            println!("Revision:   {}", t.revision);
            println!();
            println!("Learned:");
            println!("  synonyms:          {}", t.stats.synonyms_learned);
            println!("  fillers:           {}", t.stats.fillers_learned);
            println!("  keywords:          {}", t.stats.keywords_learned);
            println!("  negative keywords: {}", t.stats.negative_keywords_learned);
            if let Some(at) = t.stats.last_learned_at {
                println!("  last learned at:   {at}");
            }
            println!();
            if t.budget.monthly_budget_usd > 0.0 {
                println!(
                    "Budget:     ${:.2} of ${:.2} spent ({:.0}%)",
                    t.budget.current_spend_usd,
                    t.budget.monthly_budget_usd,
                    t.budget.utilization() * 100.0
                );
            } else {
                println!(
                    "Budget:     unlimited (${:.4} spent this month)",
                    t.budget.current_spend_usd
                );
            }
        }

        TemplateCommand::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let mut template: Template = serde_json::from_str(&content)?;

            // Adopt the stored revision so re-imports replace in place.
            match scenarios.find(&template.id).await {
                Ok(existing) => template.revision = existing.revision,
                Err(StoreError::NotFound(_)) => template.revision = 0,
                Err(e) => return Err(e.into()),
            }

            let issues = template.validate();
            for issue in &issues {
                println!("  [{:?}] {}", issue.severity, issue.message);
            }

            scenarios.save(&template).await?;
            println!(
                "Imported template '{}' ({} scenarios).",
                template.id,
                template.scenarios().count()
            );
        }
    }

    Ok(())
}
