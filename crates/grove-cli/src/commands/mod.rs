//! Command implementations and dispatch logic.

use camino::Utf8PathBuf;
use grove_config::{ConfigLoader, Settings};
use grove_core::error::{GroveError, GroveResult};
use grove_core::types::Package;
use tracing::{debug, info};

pub mod fetch;
pub mod resolve;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub settings: Settings,
    pub output: OutputHandler,
}

impl CommandContext {
    pub async fn new(force_server_query: bool) -> GroveResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| GroveError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| GroveError::ConfigValidation {
            field: "cwd".to_string(),
            reason: format!("working directory is not UTF-8: {}", e),
        })?;
        Self::load(cwd, force_server_query).await
    }

    /// Load layered settings as seen from `cwd`
    pub async fn load(cwd: Utf8PathBuf, force_server_query: bool) -> GroveResult<Self> {
        let (mut settings, sources) = ConfigLoader::new(cwd.clone()).load().await?;
        debug!("Settings loaded from {:?}", sources);
        settings.force_server_query |= force_server_query;

        Ok(Self {
            cwd,
            settings,
            output: OutputHandler::new(),
        })
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> GroveResult<()> {
    match command {
        Commands::Resolve { targets } => {
            info!("Resolving {:?}", targets);
            resolve::execute(&targets, ctx).await
        }
        Commands::Fetch {
            targets,
            rebuild_key,
        } => {
            info!("Fetching {:?}", targets);
            fetch::execute(&targets, rebuild_key.as_deref(), ctx).await
        }
    }
}

/// Parse a command-line target; a bare path means its latest version
pub fn target_package(target: &str) -> GroveResult<Package> {
    if target.contains('-') {
        Package::parse_target(target)
    } else {
        Package::parse_target(&format!("{}-*", target))
    }
}
