use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::api::DEFAULT_API_URL;
use crate::throttle::ThrottleConfig;

// Used when RUST_LOG is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "info";

pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "recipe-hub")]
#[command(about = "Command-line client for Recipe Hub")]
pub struct Args {
    // API base url
    #[arg(long, env = "RECIPE_HUB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    // Durable store file (credentials, throttle records)
    // Defaults to ~/.recipe-hub/store.json
    #[arg(long, env = "RECIPE_HUB_STORE", global = true)]
    pub store: Option<PathBuf>,

    // Throttle window in seconds
    #[arg(long, env = "RECIPE_HUB_RATE_WINDOW", default_value_t = 60, global = true)]
    pub rate_window: u64,

    // Updates within the window before a warning
    #[arg(long, env = "RECIPE_HUB_RATE_WARN", default_value_t = 2, global = true)]
    pub rate_warn: usize,

    // Updates within the window before blocking; keep below the server limit
    #[arg(long, env = "RECIPE_HUB_RATE_BLOCK", default_value_t = 4, global = true)]
    pub rate_block: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        email: String,
        password: String,
        password2: String,
    },
    Logout,
    Refresh,
    // Show the current user and session clock
    Session {
        #[arg(long)]
        watch: bool,
    },
    #[command(subcommand)]
    Recipes(RecipeCommand),
    #[command(subcommand)]
    Comment(CommentCommand),
    // Rate a recipe's difficulty from 1 (easiest) to 5 (hardest)
    Rate {
        recipe_id: u64,
        rating: u8,
    },
    #[command(subcommand)]
    Throttle(ThrottleCommand),
    Metrics,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecipeCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Show {
        id: u64,
    },
    Create(RecipeFields),
    Update {
        id: u64,
        #[command(flatten)]
        fields: RecipeFields,
    },
    Delete {
        id: u64,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecipeFields {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    // One ingredient per line
    #[arg(long)]
    pub ingredients: String,
    #[arg(long)]
    pub instructions: String,
    // Minutes
    #[arg(long)]
    pub cooking_time: u32,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CommentCommand {
    Add {
        recipe_id: u64,
        content: String,
    },
    Edit {
        recipe_id: u64,
        comment_id: u64,
        content: String,
    },
    Delete {
        recipe_id: u64,
        comment_id: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ThrottleCommand {
    Status { recipe_id: Option<u64> },
}

impl Args {
    // Warning must come before blocking, and a warning at zero updates is meaningless
    pub fn throttle_config(&self) -> Result<ThrottleConfig, clap::Error> {
        if self.rate_warn == 0 || self.rate_warn >= self.rate_block {
            return Err(Args::command().error(
                ErrorKind::ArgumentConflict,
                format!(
                    "--rate-warn ({}) must be at least 1 and below --rate-block ({})",
                    self.rate_warn, self.rate_block
                ),
            ));
        }
        Ok(ThrottleConfig {
            window: Duration::from_secs(self.rate_window),
            warn_threshold: self.rate_warn,
            block_threshold: self.rate_block,
            ..ThrottleConfig::default()
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| {
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            home.join(".recipe-hub").join("store.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_flags_become_config() {
        let args = Args::parse_from([
            "recipe-hub",
            "--rate-window",
            "30",
            "--rate-block",
            "3",
            "rate",
            "7",
            "4",
        ]);
        let cfg = args.throttle_config().unwrap();
        assert_eq!(cfg.window, Duration::from_secs(30));
        assert_eq!(cfg.warn_threshold, 2);
        assert_eq!(cfg.block_threshold, 3);
        assert!(matches!(
            args.command,
            Command::Rate {
                recipe_id: 7,
                rating: 4
            }
        ));
    }

    #[test]
    fn test_warn_must_stay_below_block() {
        let parse = |warn: &str, block: &str| {
            Args::parse_from([
                "recipe-hub",
                "--rate-warn",
                warn,
                "--rate-block",
                block,
                "logout",
            ])
        };
        let err = parse("4", "4").throttle_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        assert!(parse("5", "4").throttle_config().is_err());
        assert!(parse("0", "4").throttle_config().is_err());
        assert_eq!(parse("3", "4").throttle_config().unwrap().warn_threshold, 3);
    }

    #[test]
    fn test_default_log_filter_is_valid() {
        assert_eq!(DEFAULT_LOG_FILTER, "info");
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_explicit_store_path_wins() {
        let args = Args::parse_from(["recipe-hub", "--store", "/tmp/s.json", "logout"]);
        assert_eq!(args.store_path(), PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn test_recipe_update_flags() {
        let args = Args::parse_from([
            "recipe-hub",
            "recipes",
            "update",
            "3",
            "--title",
            "Soup",
            "--description",
            "Warm",
            "--ingredients",
            "Water\nSalt",
            "--instructions",
            "Boil",
            "--cooking-time",
            "20",
        ]);
        match args.command {
            Command::Recipes(RecipeCommand::Update { id, fields }) => {
                assert_eq!(id, 3);
                assert_eq!(fields.cooking_time, 20);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
