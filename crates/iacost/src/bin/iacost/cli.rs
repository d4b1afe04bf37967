//! iacost cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; iacost ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the projects found at a path
    Detect(DetectCommand),

    /// Map the resources of every project to cost components
    Breakdown(BreakdownCommand),

    /// List the supported resource types
    Resources(ResourcesCommand),
}

#[derive(Parser, Debug)]
pub struct DetectCommand {
    #[clap(flatten)]
    pub project: ProjectArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct BreakdownCommand {
    #[clap(flatten)]
    pub project: ProjectArgs,

    /// Usage file with estimated operational metrics per resource
    #[clap(long = "usage-file")]
    pub usage_file: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ResourcesCommand {
    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ProjectArgs {
    /// Plan, state, template or directory (defaults to the work directory)
    #[clap(conflicts_with("config_file"))]
    pub path: Option<PathBuf>,

    /// Read projects from a config file
    ///
    /// Overlay files of config file projects are used as listed,
    /// they are never grouped into environments.
    #[clap(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Overlay file, relative to the path (can be repeated, applied in order)
    #[clap(long = "var-file")]
    pub var_files: Vec<PathBuf>,

    /// Directory pattern to skip (gitignore syntax, can be repeated)
    #[clap(long = "exclude-path")]
    pub exclude_paths: Vec<String>,

    /// Keep directories called as local modules
    #[clap(long = "include-all-paths")]
    pub include_all_paths: bool,

    /// Treat the path as the only root
    #[clap(long = "skip-autodetect")]
    pub skip_autodetect: bool,

    /// Number of worker threads
    #[clap(long = "workers")]
    pub workers: Option<usize>,

    /// Give up on detection after this many seconds
    #[clap(long = "timeout")]
    pub timeout: Option<u64>,

    /// Terraform binary used to render binary plans
    #[clap(long = "terraform-binary", default_value = "terraform")]
    pub terraform_binary: PathBuf,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
