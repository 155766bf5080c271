use crate::api::{AccountClient, DEFAULT_TIMEOUT};
use crate::config::Config;
use crate::meditation::MeditationTimer;
use crate::profile_store::LocalProfileStore;
use crate::storage::FileStore;
use crate::symptoms::{SymptomCatalog, SymptomSelection};
use crate::wellness::WellnessFeeds;
use crate::wizard::WizardContext;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub type SharedStore = Arc<Mutex<LocalProfileStore<FileStore>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub account: AccountClient,
    pub feeds: WellnessFeeds,
    pub catalog: Arc<SymptomCatalog>,
    /// Wizard progress for the account currently on the setup page.
    pub wizard: Arc<Mutex<Option<WizardContext>>>,
    /// Chips picked on the tracker page and not yet saved.
    pub symptoms: Arc<Mutex<SymptomSelection>>,
    pub meditation: Arc<Mutex<MeditationTimer>>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        store: FileStore,
        client: Client,
        shutdown: CancellationToken,
    ) -> Self {
        let account =
            AccountClient::with_client(client.clone(), &config.api_base, shutdown.clone());
        let feeds = WellnessFeeds::new(
            client,
            config.quote_feed_url.clone(),
            config.advice_feed_url.clone(),
            DEFAULT_TIMEOUT,
        );
        let meditation = MeditationTimer::new(config.meditation_tick, shutdown.clone());

        Self {
            config: Arc::new(config),
            store: Arc::new(Mutex::new(LocalProfileStore::new(store))),
            account,
            feeds,
            catalog: Arc::new(SymptomCatalog::standard()),
            wizard: Arc::new(Mutex::new(None)),
            symptoms: Arc::new(Mutex::new(SymptomSelection::new())),
            meditation: Arc::new(Mutex::new(meditation)),
            shutdown,
        }
    }
}
