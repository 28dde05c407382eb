//! CLI definitions for cadence.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// cadence CLI.
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Trigger evaluation and flow scheduling engine")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true, env = "CADENCE_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in the foreground (default)
    Run {
        /// Keep triggers in memory instead of the configured store
        #[arg(long)]
        in_memory: bool,
    },

    /// Inspect and administer stored triggers
    Triggers {
        #[command(subcommand)]
        action: TriggersAction,
    },

    /// Manage flow schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum TriggersAction {
    /// List stored triggers
    List {
        /// Only triggers of this source
        #[arg(long)]
        source: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show one trigger with its persisted record
    Show {
        /// Trigger ID
        id: i64,
    },

    /// Remove a trigger
    Remove {
        /// Trigger ID
        id: i64,
    },

    /// Stop scanning a trigger until resumed
    Pause {
        /// Trigger ID
        id: i64,
    },

    /// Re-arm a paused trigger
    Resume {
        /// Trigger ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum ScheduleAction {
    /// Schedule a flow, replacing any existing schedule for it
    Add {
        #[arg(long)]
        project_id: i64,

        #[arg(long)]
        project_name: String,

        #[arg(long)]
        flow: String,

        /// First execution time (RFC 3339)
        #[arg(long)]
        first_time: String,

        /// IANA timezone for recurrence
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Recurrence period, e.g. 1d or 30m
        #[arg(long, conflicts_with = "cron")]
        period: Option<String>,

        /// Cron expression (sec min hour dom month dow [year])
        #[arg(long)]
        cron: Option<String>,

        /// Stop scheduling after this time (RFC 3339)
        #[arg(long)]
        end_time: Option<String>,

        /// Submitting user (defaults to executor.submit_user)
        #[arg(long)]
        user: Option<String>,
    },

    /// List schedules
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Remove the schedule of a flow
    Remove {
        #[arg(long)]
        project_id: i64,

        #[arg(long)]
        flow: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Load and validate the configuration, then print the effective values
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_period_and_cron_conflict() {
        let result = Cli::try_parse_from([
            "cadence", "schedule", "add", "--project-id", "1", "--project-name", "etl", "--flow",
            "load", "--first-time", "2024-03-01T09:00:00Z", "--period", "1d", "--cron",
            "0 0 9 * * ?",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["cadence"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }
}
