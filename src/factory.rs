//! Service factory (C6): a keyed cache of live provider adapters with lazy
//! TTL expiry. `get_service` never fails — a provider that can't be built
//! falls back to the inert [`EmptyAdapter`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::canonical::ProviderTag;
use crate::config::RuntimeConfig;
use crate::providers::{
    anthropic::AnthropicAdapter, empty::EmptyAdapter, gemini::GeminiAdapter,
    ollama::OllamaAdapter, openai::OpenAiFamilyAdapter, Adapter,
};

/// Opaque provider credential. The factory only ever stores its SHA-256
/// fingerprint, never the material itself.
#[derive(Debug, Clone)]
pub struct Credential(pub String);

impl Credential {
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

type CacheKey = (ProviderTag, String);

struct CacheEntry {
    adapter: Arc<dyn Adapter>,
    created_at: Instant,
}

/// Builds and caches per-`(provider, credential)` adapters.
pub struct ServiceFactory {
    config: RuntimeConfig,
    cache: RwLock<FxHashMap<CacheKey, CacheEntry>>,
    http: reqwest::Client,
}

impl ServiceFactory {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            cache: RwLock::new(FxHashMap::default()),
            http,
        }
    }

    /// Fetch (building and caching if necessary) the adapter for
    /// `(provider, credential)`. Never returns an error: a provider that
    /// fails to construct yields a cached [`EmptyAdapter`] for the
    /// remainder of the TTL.
    pub async fn get_service(&self, provider: ProviderTag, credential: &Credential) -> Arc<dyn Adapter> {
        let key = (provider, credential.fingerprint());
        let ttl = self.config.service_ttl;

        if let Some(entry) = self.cache.read().get(&key) {
            if entry.created_at.elapsed() < ttl {
                return entry.adapter.clone();
            }
        }

        let adapter = self.build(provider, credential);
        self.cache.write().insert(
            key,
            CacheEntry {
                adapter: adapter.clone(),
                created_at: Instant::now(),
            },
        );
        adapter
    }

    fn build(&self, provider: ProviderTag, credential: &Credential) -> Arc<dyn Adapter> {
        let built: Option<Arc<dyn Adapter>> = match provider {
            ProviderTag::OpenAiFamily(variant) => Some(Arc::new(OpenAiFamilyAdapter::new(
                variant,
                credential.0.clone(),
                self.http.clone(),
                self.config.base_url_for(provider),
            ))),
            ProviderTag::Anthropic => Some(Arc::new(AnthropicAdapter::new(
                credential.0.clone(),
                self.http.clone(),
                self.config.base_url_for(provider),
            ))),
            ProviderTag::Gemini => Some(Arc::new(GeminiAdapter::new(
                credential.0.clone(),
                self.http.clone(),
                self.config.base_url_for(provider),
            ))),
            ProviderTag::Ollama => Some(Arc::new(OllamaAdapter::new(
                self.http.clone(),
                self.config.base_url_for(provider),
            ))),
            ProviderTag::Empty => None,
        };

        match built {
            Some(adapter) => adapter,
            None => Arc::new(EmptyAdapter),
        }
    }

    /// Clear the cache. Adapters with in-flight streams keep running against
    /// their own `Arc` clone until their caller drops or cancels the stream.
    pub async fn dispose_all(&self) {
        self.cache.write().clear();
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}
