//! The `ptolemy` command line.
//!
//! ```text
//! ptolemy serve [--apis DIR] [--ignore NAME]... [--port PORT] [--config FILE] [--env NAME] [--force]
//! ptolemy check DIR [--emit DIR] [--allow-unbound]
//! ```
//!
//! Services with their own handlers call [`run`] from their `main` with
//! their [`HandlerTable`]. The stock binary passes an empty one.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ptolemy_compiler::{ApiSpecification, Compiler, HandlerPolicy};
use ptolemy_config::{ConfigLoader, PtolemyConfig, ENV_NAME_VAR, ENV_PREFIX};
use ptolemy_core::{HandlerTable, ModelRegistry};
use ptolemy_server::{ping_handlers, PingInfo};
use ptolemy_telemetry::init_logging;
use tracing::{error, info};

use crate::app::App;
use crate::discover::discover_apis;
use crate::error::AppResult;

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ptolemy.toml";

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "ptolemy", version, about = "Serve OpenAPI 2.0 documents")]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile every API document and serve them
    Serve(ServeArgs),
    /// Compile API documents without serving
    Check(CheckArgs),
}

/// Arguments for `ptolemy serve`.
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Directory holding the API documents
    #[arg(long)]
    pub apis: Option<PathBuf>,

    /// API names to skip (can be used multiple times)
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file (toml, json or yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Environment name, selects `ptolemy.<env>.<ext>`
    #[arg(long)]
    pub env: Option<String>,

    /// Recompile cached model artifacts
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `ptolemy check`.
#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Directory holding the API documents
    pub dir: PathBuf,

    /// Write compiled model artifacts to this directory
    #[arg(long)]
    pub emit: Option<PathBuf>,

    /// Accept operations whose handler is not registered
    #[arg(long)]
    pub allow_unbound: bool,

    /// API names to skip (can be used multiple times)
    #[arg(long)]
    pub ignore: Vec<String>,
}

/// One compiled document, as reported by `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedApi {
    /// API name.
    pub name: String,
    /// Models compiled.
    pub models: usize,
    /// Operations bound.
    pub endpoints: usize,
}

/// Parses the process arguments and runs the command.
///
/// Returns a failure exit code on any configuration, compile or bind error.
pub async fn run(handlers: HandlerTable) -> ExitCode {
    run_with(Cli::parse(), handlers).await
}

/// Runs already parsed arguments.
pub async fn run_with(cli: Cli, handlers: HandlerTable) -> ExitCode {
    let result = match cli.command {
        Command::Serve(args) => serve(args, handlers).await,
        Command::Check(args) => check(&args, handlers).map(|apis| {
            for api in apis {
                println!(
                    "{}: {} models, {} endpoints",
                    api.name, api.models, api.endpoints
                );
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ptolemy failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `ptolemy serve`.
pub async fn serve(args: ServeArgs, handlers: HandlerTable) -> AppResult<()> {
    let config = load_config(&args)?;
    init_logging(&config.log_config())?;

    let environment = args
        .env
        .clone()
        .or_else(|| std::env::var(ENV_NAME_VAR).ok())
        .unwrap_or_else(|| "dev".to_string());
    info!(env = %environment, apis = %config.apis.path.display(), "starting");

    App::new(config)
        .service("ptolemy", env!("CARGO_PKG_VERSION"))
        .environment(environment)
        .port(args.port)
        .handlers(handlers)
        .discover()
        .serve()
        .await
}

/// Loads configuration for `serve` and applies the command line on top.
pub fn load_config(args: &ServeArgs) -> AppResult<PtolemyConfig> {
    let base = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut loader = ConfigLoader::new().with_dotenv();
    loader = if args.config.is_some() {
        loader.with_file(&base)?
    } else {
        loader.with_optional_file(&base)?
    };
    let mut config = loader
        .with_env_file(&base, args.env.as_deref())?
        .with_env_prefix(ENV_PREFIX)
        .load()?;

    if let Some(apis) = &args.apis {
        config.apis.path.clone_from(apis);
    }
    config.apis.ignore.extend(args.ignore.iter().cloned());
    if let Some(stem) = args.config.as_deref().and_then(config_stem) {
        config.apis.ignore.push(stem);
    }
    config.apis.force |= args.force;
    Ok(config)
}

fn config_stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// `ptolemy check`: compiles every document under `args.dir`.
///
/// Handlers resolve against the builtin table plus `handlers`. With
/// `allow_unbound`, missing ones are stubbed instead of failing.
pub fn check(args: &CheckArgs, handlers: HandlerTable) -> AppResult<Vec<CheckedApi>> {
    let mut table = ping_handlers(Arc::new(PingInfo::new("ptolemy", env!("CARGO_PKG_VERSION"))));
    table.merge(handlers);

    let policy = if args.allow_unbound {
        HandlerPolicy::Stub
    } else {
        HandlerPolicy::Require
    };
    let mut compiler = Compiler::new().with_handler_policy(policy);
    if let Some(dir) = &args.emit {
        compiler = compiler.with_artifacts(Some(dir.clone())).with_force(true);
    }

    let mut registry = ModelRegistry::new();
    let mut checked = Vec::new();
    for file in discover_apis(&args.dir, &args.ignore)? {
        let spec = ApiSpecification::load_named(file.name, &file.path)?;
        let api = compiler.compile(&spec, &mut registry, &table)?;
        checked.push(CheckedApi {
            name: api.name,
            models: api.models.len(),
            endpoints: api.bindings.len(),
        });
    }
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "ptolemy", "serve", "--apis", "services", "--ignore", "legacy", "--ignore", "admin",
            "--port", "9000", "--env", "staging", "--force",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.apis, Some(PathBuf::from("services")));
        assert_eq!(args.ignore, vec!["legacy", "admin"]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.env.as_deref(), Some("staging"));
        assert!(args.force);
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["ptolemy", "check", "apis", "--emit", "out"]).unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.dir, PathBuf::from("apis"));
        assert_eq!(args.emit, Some(PathBuf::from("out")));
        assert!(!args.allow_unbound);
    }

    #[test]
    fn test_bad_port_rejected() {
        assert!(Cli::try_parse_from(["ptolemy", "serve", "--port", "http"]).is_err());
    }

    #[test]
    fn test_load_config_applies_flags() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.toml");
        std::fs::write(&file, "[apis]\nignore = [\"old\"]\n").unwrap();

        let args = ServeArgs {
            apis: Some(dir.path().to_path_buf()),
            ignore: vec!["beta".to_string()],
            config: Some(file),
            force: true,
            ..ServeArgs::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.apis.path, dir.path());
        assert_eq!(config.apis.ignore, vec!["old", "beta", "settings"]);
        assert!(config.apis.force);
    }
}
