use clap::{Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use std::io;
use std::path::PathBuf;
use toolbelt::ToolbeltConfig;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "toolbelt")]
#[command(version)]
#[command(about = "Discover, validate and run hot-reloadable file-backed tools")]
#[command(long_about = "
toolbelt loads every markdown tool unit under a folder, caches the results and
keeps them up to date while the files change.

Example usage:
  toolbelt list                          # Show all tools
  toolbelt call hello --arg name=Ada     # Run a tool
  toolbelt validate                      # Check every unit
  toolbelt watch                         # Follow changes live
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Folder containing tool units (defaults to $TOOLBELT_TARGET_FOLDER or ./tools)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Glob selecting tool units under the folder (defaults to **/*.md)
    #[arg(long, global = true)]
    pub glob: Option<String>,

    /// Append logs to this file instead of stderr (or set TOOLBELT_LOG_FILE)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all available tools
    #[command(long_about = "
Loads every tool unit in the folder and prints its name, description and
source file. Units that fail to load are skipped and reported in the log.

Examples:
  toolbelt list                  # Table output
  toolbelt list --format json    # JSON, including input schemas
")]
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Run a tool and print its result
    #[command(long_about = "
Loads a single tool by name and runs it. Arguments come from --json (an object)
and from repeated --arg key=value pairs, which take precedence. A value that
parses as JSON is passed as such, otherwise it is passed as a string.

Examples:
  toolbelt call hello --arg name=Ada
  toolbelt call sum --json '{\"numbers\": [1, 2, 3]}'
")]
    Call {
        /// Name of the tool (its file name without extension)
        name: String,

        /// Argument as key=value; may be repeated
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Arguments as a JSON object
        #[arg(long, value_name = "OBJECT")]
        json: Option<String>,
    },
    /// Validate every tool unit in the folder
    #[command(long_about = "
Loads every matching file once, without using the cache, and reports each unit
that fails to load.

Exit codes:
  0 - All units are valid
  2 - At least one unit is invalid
")]
    Validate {
        /// Only print invalid units
        #[arg(short, long)]
        quiet: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ValidateFormat,
    },
    /// Watch the folder and print the tool list whenever it changes
    Watch,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    #[allow(dead_code)]
    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }

    /// Environment configuration with command line overrides applied
    pub fn config(&self) -> ToolbeltConfig {
        let mut config = ToolbeltConfig::from_env();
        if let Some(dir) = &self.dir {
            config.target_folder = dir.clone();
        }
        if let Some(glob) = &self.glob {
            config.glob = glob.clone();
        }
        config
    }

    /// Log file from the flag, falling back to `TOOLBELT_LOG_FILE`
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| std::env::var_os("TOOLBELT_LOG_FILE").map(PathBuf::from))
    }

    pub fn is_tty() -> bool {
        io::stdout().is_terminal()
    }

    pub fn should_use_color() -> bool {
        Self::is_tty() && std::env::var("NO_COLOR").is_err()
    }
}
