//! Halldyll CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll-fargate command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use halldyll_deploy_fargate::cli::{Cli, Commands, OutputFormatter, StateCommands};
use halldyll_deploy_fargate::components::ComponentRegistry;
use halldyll_deploy_fargate::config::{
    ConfigParser, ConfigValidator, DeployConfig, StateBackend, find_config_file,
};
use halldyll_deploy_fargate::error::{ConfigError, Result};
use halldyll_deploy_fargate::orchestrator::ServiceOrchestrator;
use halldyll_deploy_fargate::provider::{AwsProviderClient, load_sdk_config};
use halldyll_deploy_fargate::state::{
    LocalStateStore, S3StateStore, STATE_DIR, StateStore, generate_holder_id,
};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings),
        Commands::Plan { detailed } => cmd_plan(config_path, detailed, &formatter).await,
        Commands::Deploy { yes } => cmd_deploy(config_path, yes, &formatter).await,
        Commands::Status => cmd_status(config_path, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&Path>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;

    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.qualified_name());
    eprintln!("  Service: {}", config.service.name);
    eprintln!(
        "  Task size: {} CPU / {} MiB",
        config.service.cpu, config.service.memory
    );
    eprintln!("  Containers: {}", config.service.containers.len());
    eprintln!("  Desired tasks: {}", config.service.desired_count);
    eprintln!(
        "  Network: {}",
        if config.service.has_explicit_network() {
            "explicit"
        } else {
            "provisioned"
        }
    );

    Ok(())
}

/// Show deployment plan.
async fn cmd_plan(
    config_path: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let (client, registry) = create_provider(&config).await;
    let orchestrator = ServiceOrchestrator::new(state_store.as_ref(), &client, &registry);

    let plan = orchestrator.plan(&config).await?;
    eprintln!("{}", formatter.format_plan(&plan, detailed));

    Ok(())
}

/// Deploy the service.
async fn cmd_deploy(
    config_path: Option<&Path>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let (client, registry) = create_provider(&config).await;
    let orchestrator = ServiceOrchestrator::new(state_store.as_ref(), &client, &registry);

    let plan = orchestrator.plan(&config).await?;
    eprintln!("{}", formatter.format_plan(&plan, false));

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Deploy cancelled.");
        return Ok(());
    }

    let key = config.service.state_key();
    let lock = state_store.acquire_lock(key, &generate_holder_id()).await?;
    let result = orchestrator.deploy(&config).await;
    release_lock(state_store.as_ref(), key, &lock.lock_id).await;

    let outputs = result?;
    eprintln!("{}", formatter.format_outputs(&outputs));
    if !outputs.converged {
        warn!("Some tasks have not reached their desired status yet; run 'status' to refresh");
    }

    Ok(())
}

/// Show deployment status.
async fn cmd_status(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let (client, registry) = create_provider(&config).await;
    let orchestrator = ServiceOrchestrator::new(state_store.as_ref(), &client, &registry);

    let key = config.service.state_key();
    let lock = state_store.acquire_lock(key, &generate_holder_id()).await?;
    let result = orchestrator.get(&config).await;
    release_lock(state_store.as_ref(), key, &lock.lock_id).await;

    match result? {
        Some(outputs) => eprintln!("{}", formatter.format_outputs(&outputs)),
        None => eprintln!("Service {} is not deployed.", config.service.name),
    }

    Ok(())
}

/// Destroy the service and its network.
async fn cmd_destroy(config_path: Option<&Path>, auto_approve: bool) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let (client, registry) = create_provider(&config).await;
    let orchestrator = ServiceOrchestrator::new(state_store.as_ref(), &client, &registry);

    let state = orchestrator.load_state(&config).await?;
    if state.is_empty() {
        eprintln!("Nothing to destroy.");
        return Ok(());
    }

    eprintln!("The following resources will be destroyed:");
    if let Some(service) = &state.service {
        eprintln!("  - service {}", service.service_name);
    }
    if let Some(td) = &state.task_definition {
        eprintln!("  - task definition {}", td.family_revision());
    }
    for (role, id) in state.network.present() {
        eprintln!("  - {role} {id}");
    }

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let key = config.service.state_key();
    let lock = state_store.acquire_lock(key, &generate_holder_id()).await?;
    let result = orchestrator.remove(&config).await;
    release_lock(state_store.as_ref(), key, &lock.lock_id).await;
    result?;

    eprintln!("\nService {} destroyed.", config.service.name);
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let key = config.service.state_key();

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load(key).await? {
                eprintln!("{}", formatter.format_state(&state));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = state_store.acquire_lock(key, &holder).await?;
            eprintln!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = state_store.get_lock_info(key).await? {
                    state_store.release_lock(key, &lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                } else {
                    eprintln!("State is not locked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(key, &id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

/// Directory holding the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Releases a lock, logging instead of failing.
async fn release_lock(state_store: &dyn StateStore, key: &str, lock_id: &str) {
    if let Err(e) = state_store.release_lock(key, lock_id).await {
        warn!("Failed to release state lock {lock_id}: {e}");
    }
}

/// Loads configuration and creates appropriate state store.
async fn load_config_and_state(
    config_path: Option<&Path>,
) -> Result<(DeployConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    ConfigValidator::new().validate(&config)?;

    // Create state store based on config
    let state_store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => {
            let path = config.state.path.as_ref().map_or_else(
                || config_dir(&config_file).join(STATE_DIR),
                PathBuf::from,
            );
            Box::new(LocalStateStore::with_base_dir(path))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| ConfigError::validation("S3 bucket not configured", "state.bucket"))?;
            let region = config
                .state
                .region
                .as_deref()
                .or(config.project.region.as_deref());
            Box::new(S3StateStore::new(bucket, config.state.prefix.as_deref(), region).await)
        }
    };

    Ok((config, state_store))
}

/// Creates the AWS provider client and the ECS component registry.
async fn create_provider(config: &DeployConfig) -> (AwsProviderClient, ComponentRegistry) {
    let sdk_config = load_sdk_config(config.project.region.as_deref()).await;
    let client = AwsProviderClient::from_conf(&sdk_config);
    let registry = ComponentRegistry::ecs(client.ecs());
    (client, registry)
}
