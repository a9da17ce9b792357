//! Server application state shared across handlers

use super::events::EventBroadcaster;
use crate::config::{StorageBackend, TwyneConfig};
use crate::connections::{
    ConnectionService, HttpJsonFetch, JsonFetch, OAuthTokenExchanger, TokenExchange,
};
use crate::events::EventSink;
use crate::llm::{ChatCompletion, OpenAiClient};
use crate::onboarding::{HttpSmsEcho, PersistenceSync, SessionRegistry, SmsEcho, TurnOrchestrator};
use crate::shutdown::ShutdownState;
use crate::storage::{
    DraftStore, FileProfileStore, MemoryProfileStore, ProfileStore, SupabaseProfileStore,
};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// External services the server talks to
pub struct Collaborators {
    pub llm: Arc<dyn ChatCompletion>,
    pub store: Arc<dyn ProfileStore>,
    pub exchanger: Arc<dyn TokenExchange>,
    pub fetch: Arc<dyn JsonFetch>,
    pub sms: Option<Arc<dyn SmsEcho>>,
    /// Soft-stop random source; entropy-seeded when unset
    pub rng: Option<Box<dyn RngCore + Send>>,
}

impl Collaborators {
    /// Real HTTP-backed collaborators for `config`
    pub fn from_config(config: &TwyneConfig) -> Result<Self, String> {
        if !config.llm.has_api_key() {
            log::warn!("No LLM API key configured; every completion will fail and fall back");
        }
        let llm = OpenAiClient::new(config.llm.api_key.clone().unwrap_or_default())
            .with_model(config.llm.model.clone())
            .with_base_url(config.llm.base_url.clone());

        let store: Arc<dyn ProfileStore> = match config.storage.backend {
            StorageBackend::File => {
                Arc::new(FileProfileStore::new(&config.storage.resolved_data_dir()))
            }
            StorageBackend::Supabase => {
                let url = config
                    .storage
                    .supabase_url
                    .clone()
                    .ok_or("Supabase storage requires storage.supabase_url")?;
                let key = config
                    .storage
                    .supabase_key
                    .clone()
                    .ok_or("Supabase storage requires storage.supabase_key")?;
                Arc::new(SupabaseProfileStore::new(url, key).with_table(config.storage.table.clone()))
            }
            StorageBackend::Memory => Arc::new(MemoryProfileStore::new()),
        };

        let sms = config.sms.echo_url.clone().map(|url| {
            Arc::new(HttpSmsEcho::new(url, Duration::from_secs(config.sms.timeout_secs)))
                as Arc<dyn SmsEcho>
        });

        Ok(Self {
            llm: Arc::new(llm),
            store,
            exchanger: Arc::new(OAuthTokenExchanger::new(
                config.connections.spotify.clone(),
                config.connections.google.clone(),
            )),
            fetch: Arc::new(HttpJsonFetch::new(PROVIDER_READ_TIMEOUT)),
            sms,
            rng: None,
        })
    }
}

/// Shared state for the server
#[derive(Clone)]
pub struct ServerAppState {
    /// Authentication token for this server run
    pub auth_token: String,

    pub shutdown_state: ShutdownState,

    /// Event broadcaster for WebSocket clients
    pub broadcaster: Arc<EventBroadcaster>,

    pub config: Arc<TwyneConfig>,

    /// Live onboarding sessions
    pub sessions: Arc<SessionRegistry>,

    pub orchestrator: Arc<TurnOrchestrator>,

    pub connections: Arc<ConnectionService>,
}

impl ServerAppState {
    /// Wire the onboarding components to `collaborators`
    pub fn new(
        auth_token: String,
        shutdown_state: ShutdownState,
        config: TwyneConfig,
        collaborators: Collaborators,
    ) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let events: Arc<dyn EventSink> = broadcaster.clone();

        // In-memory storage keeps nothing on disk, drafts included
        let drafts = match config.storage.backend {
            StorageBackend::Memory => None,
            _ => Some(DraftStore::new(&config.storage.resolved_data_dir())),
        };

        let timeouts = config.llm.call_timeouts();
        let retry = config.connections.retry_policy();

        let mut persistence =
            PersistenceSync::new(collaborators.store.clone(), events.clone()).with_retry(retry);
        if let Some(drafts) = &drafts {
            persistence = persistence.with_drafts(drafts.clone());
        }

        let mut orchestrator =
            TurnOrchestrator::new(collaborators.llm.clone(), Arc::new(persistence), events.clone())
                .with_policy(config.onboarding.stop_policy())
                .with_timeouts(timeouts);
        if let Some(sms) = collaborators.sms {
            orchestrator = orchestrator.with_sms(sms);
        }
        if let Some(rng) = collaborators.rng {
            orchestrator = orchestrator.with_rng(rng);
        }

        let connections = ConnectionService::new(
            collaborators.exchanger,
            collaborators.fetch,
            collaborators.store,
            events,
        )
        .with_insights(collaborators.llm, timeouts)
        .with_retry(retry);

        Self {
            auth_token,
            shutdown_state,
            broadcaster,
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new(drafts)),
            orchestrator: Arc::new(orchestrator),
            connections: Arc::new(connections),
        }
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        self.broadcaster.clone()
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        self.orchestrator.persistence().store()
    }
}
