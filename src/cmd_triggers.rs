//! Trigger subcommand handlers.

use anyhow::{Context, Result};

use cadence_scheduler::TriggerSnapshot;

use crate::cli::{OutputFormat, TriggersAction};
use crate::register::Engine;

/// Handle trigger subcommands.
pub(crate) async fn handle_triggers_command(engine: &Engine, action: TriggersAction) -> Result<()> {
    let manager = &engine.triggers;
    match action {
        TriggersAction::List { source, format } => {
            let triggers = match source {
                Some(source) => manager.get_triggers_by_source(&source).await?,
                None => manager.get_triggers().await?,
            };
            print_triggers(&triggers, format)
        }
        TriggersAction::Show { id } => {
            let snapshot = manager
                .get_trigger(id)
                .await
                .with_context(|| format!("trigger {id}"))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        TriggersAction::Remove { id } => {
            manager.remove_trigger(id).await?;
            println!("Removed trigger {id}");
            Ok(())
        }
        TriggersAction::Pause { id } => {
            manager.pause_trigger(id).await?;
            println!("Paused trigger {id}");
            Ok(())
        }
        TriggersAction::Resume { id } => {
            manager.resume_trigger(id).await?;
            println!("Resumed trigger {id}");
            Ok(())
        }
    }
}

fn print_triggers(triggers: &[TriggerSnapshot], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(triggers)?);
        }
        OutputFormat::Table => {
            if triggers.is_empty() {
                println!("No triggers.");
                return Ok(());
            }
            println!(
                "{:<8} {:<20} {:<8} {:<26} {:>8}",
                "ID", "SOURCE", "STATUS", "NEXT CHECK", "FAILURES"
            );
            for t in triggers {
                let next = t
                    .next_check_time
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<8} {:<20} {:<8} {:<26} {:>8}",
                    t.trigger_id,
                    t.source,
                    t.status.to_string(),
                    next,
                    t.consecutive_failures
                );
            }
        }
    }
    Ok(())
}
