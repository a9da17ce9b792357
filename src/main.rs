use clap::Parser;
use std::path::PathBuf;
use twyne_lib::config::{
    ConfigLoader, PartialConfig, PartialLlmConfig, PartialOnboardingConfig, PartialServerConfig,
    PartialStorageConfig, StorageBackend,
};
use twyne_lib::onboarding::PolicyKind;
use twyne_lib::server::{self, generate_auth_token, Collaborators, ServerAppState};
use twyne_lib::shutdown::{register_signal_handlers, ShutdownState};

/// Twyne onboarding server - conversational onboarding and profile synthesis over HTTP
#[derive(Parser, Debug)]
#[command(name = "twyne-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.twyne/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind the server to
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind the server to
    #[arg(long)]
    bind: Option<String>,

    /// Fixed auth token (or set TWYNE_SERVER_TOKEN).
    /// If not provided, a random token is generated on each startup
    #[arg(long, env = "TWYNE_SERVER_TOKEN")]
    token: Option<String>,

    /// Directory for drafts and file-backed profiles
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Profile storage backend: file, supabase or memory
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// Stop policy: fixed_cap or coverage_gated
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Hard cap on user answers per conversation
    #[arg(long)]
    max_turns: Option<usize>,

    /// Model name passed to the completion endpoint
    #[arg(long)]
    model: Option<String>,
}

impl Cli {
    fn overrides(&self) -> PartialConfig {
        PartialConfig {
            llm: Some(PartialLlmConfig {
                model: self.model.clone(),
                ..Default::default()
            }),
            onboarding: Some(PartialOnboardingConfig {
                max_turns: self.max_turns,
                policy: self.policy,
                ..Default::default()
            }),
            storage: Some(PartialStorageConfig {
                backend: self.storage,
                data_dir: self.data_dir.clone(),
                ..Default::default()
            }),
            server: Some(PartialServerConfig {
                port: self.port,
                bind: self.bind.clone(),
                token: self.token.clone(),
                cors_origins: None,
            }),
            ..Default::default()
        }
    }
}

fn main() {
    let cli = Cli::parse();
    env_logger::init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = match loader.load(Some(cli.overrides())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        let shutdown_state = ShutdownState::new();
        if let Err(e) = register_signal_handlers(shutdown_state.clone()) {
            log::warn!("Failed to register signal handlers: {}", e);
        }

        let collaborators = Collaborators::from_config(&config)?;
        let auth_token = config
            .server
            .token
            .clone()
            .unwrap_or_else(generate_auth_token);

        let state = ServerAppState::new(auth_token, shutdown_state, config, collaborators);
        server::run_server(state).await
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
