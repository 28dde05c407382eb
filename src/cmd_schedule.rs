//! Schedule subcommand handlers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use cadence_config::Config;
use cadence_core::time::parse_timezone;
use cadence_core::Period;
use cadence_scheduler::Schedule;

use crate::cli::{OutputFormat, ScheduleAction};
use crate::register::Engine;

fn parse_instant(flag: &str, value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("--{flag} must be an RFC 3339 timestamp, got '{value}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Handle schedule subcommands.
pub(crate) async fn handle_schedule_command(
    engine: &Engine,
    config: &Config,
    action: ScheduleAction,
) -> Result<()> {
    let schedules = &engine.schedules;
    match action {
        ScheduleAction::Add {
            project_id,
            project_name,
            flow,
            first_time,
            timezone,
            period,
            cron,
            end_time,
            user,
        } => {
            let now = Utc::now();
            let user = user.unwrap_or_else(|| config.executor.submit_user.clone());
            let mut schedule = Schedule::new(
                project_id,
                project_name,
                flow,
                parse_instant("first-time", &first_time)?,
                user,
                now,
            )
            .with_timezone(parse_timezone(&timezone)?);
            if let Some(period) = period {
                schedule = schedule.with_period(Period::parse(&period)?);
            }
            if let Some(cron) = cron {
                schedule = schedule.with_cron(cron);
            }
            if let Some(end_time) = end_time {
                schedule = schedule.with_end_time(parse_instant("end-time", &end_time)?);
            }

            let stored = schedules.schedule_flow(schedule).await?;
            let next = stored
                .next_exec_time
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "Scheduled {}.{} as trigger {}, next execution {next}",
                stored.project_name,
                stored.flow_name,
                stored.schedule_id.unwrap_or_default()
            );
            Ok(())
        }
        ScheduleAction::List { format } => {
            let all = schedules.get_schedules().await?;
            print_schedules(&all, format)
        }
        ScheduleAction::Remove { project_id, flow } => {
            if schedules.remove_schedule(project_id, &flow).await? {
                println!("Removed schedule for {project_id}/{flow}");
            } else {
                println!("No schedule for {project_id}/{flow}");
            }
            Ok(())
        }
    }
}

fn recurrence(schedule: &Schedule) -> String {
    match (&schedule.period, &schedule.cron_expression) {
        (Some(period), _) => format!("every {period}"),
        (None, Some(cron)) => format!("cron '{cron}'"),
        (None, None) => "once".to_string(),
    }
}

fn print_schedules(schedules: &[Schedule], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(schedules)?);
        }
        OutputFormat::Table => {
            if schedules.is_empty() {
                println!("No schedules.");
                return Ok(());
            }
            println!(
                "{:<8} {:<30} {:<26} {:<20} {:<16}",
                "ID", "FLOW", "NEXT EXECUTION", "RECURRENCE", "TIMEZONE"
            );
            for s in schedules {
                let next = s
                    .next_exec_time
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<8} {:<30} {:<26} {:<20} {:<16}",
                    s.schedule_id.unwrap_or_default(),
                    format!("{}.{}", s.project_name, s.flow_name),
                    next,
                    recurrence(s),
                    s.timezone.to_string()
                );
            }
        }
    }
    Ok(())
}
