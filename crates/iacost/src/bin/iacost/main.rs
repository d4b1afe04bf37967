mod cli;

use anyhow::Context;
use iacost::config::{Config, ProjectConfig};
use iacost::detect::{self, DetectOptions};
use iacost::format::Sniffer;
use iacost::provider::{self, ProviderContext, TerraformCli};
use iacost::registry::Registry;
use iacost::usage::{NoUsage, UsageFile, UsageSource};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("IACOST_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Detect(detect_cli) => detect(detect_cli),
        cli::Command::Breakdown(breakdown_cli) => breakdown(breakdown_cli),
        cli::Command::Resources(resources_cli) => resources(resources_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn detect(cli: cli::DetectCommand) -> anyhow::Result<()> {
    let (config, options) = load(&cli.project)?;

    let mut projects = vec![];
    for project in &config.projects {
        let providers = detect::detect(project, &config, &options)?;
        projects.extend(providers.iter().map(|p| p.metadata().clone()));
    }

    output(&cli.output, &projects)
}

pub fn breakdown(cli: cli::BreakdownCommand) -> anyhow::Result<()> {
    let (config, options) = load(&cli.project)?;
    let registry = Registry::builtin(config.defaults.clone())?;

    let mut breakdowns = vec![];
    for project in &config.projects {
        let usage_file = cli.usage_file.as_ref().or(project.usage_file.as_ref());
        let usage: Box<dyn UsageSource> = match usage_file {
            Some(path) => Box::new(
                UsageFile::load(path)
                    .with_context(|| format!("Failed to load usage file {}", path.display()))?,
            ),
            None => Box::new(NoUsage),
        };

        for provider in detect::detect(project, &config, &options)? {
            match provider::breakdown(provider.as_ref(), &registry, usage.as_ref(), options.workers) {
                Ok(breakdown) => breakdowns.push(breakdown),
                Err(err) => {
                    let err = anyhow::Error::from(err);
                    tracing::warn!(project = %provider.metadata().name, "skipping project: {err:#}")
                }
            }
        }
    }

    output(&cli.output, &breakdowns)
}

#[derive(Serialize)]
struct ResourceType {
    name: &'static str,
    notes: &'static [&'static str],
}

pub fn resources(cli: cli::ResourcesCommand) -> anyhow::Result<()> {
    let registry = Registry::builtin(Default::default())?;
    let resource_types: Vec<_> = registry
        .items()
        .into_iter()
        .map(|item| ResourceType {
            name: item.name,
            notes: item.notes,
        })
        .collect();

    output(&cli.output, &resource_types)
}

/// Projects from the config file, or the single project described by the arguments
fn load(args: &cli::ProjectArgs) -> anyhow::Result<(Config, DetectOptions)> {
    let config = match &args.config_file {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => Config::for_project(ProjectConfig {
            path: args.path.clone().unwrap_or_else(|| PathBuf::from(".")),
            name: None,
            var_files: args.var_files.clone(),
            exclude_paths: args.exclude_paths.clone(),
            include_all_paths: args.include_all_paths,
            skip_autodetect: args.skip_autodetect,
            usage_file: None,
        }),
    };

    let options = DetectOptions {
        workers: args.workers.unwrap_or_else(detect::default_workers),
        timeout: args.timeout.map(Duration::from_secs),
        context: ProviderContext {
            sniffer: Sniffer::from_env(),
            plan_renderer: Arc::new(TerraformCli {
                binary: args.terraform_binary.clone(),
            }),
            ..Default::default()
        },
        changed_objects: vec![],
    };

    Ok((config, options))
}

fn output<T: Serialize>(output: &cli::OutputArgs, value: &T) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
