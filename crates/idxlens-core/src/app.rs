use std::sync::Arc;

use crate::adapters::GatewayAdapter;
use crate::cache::{CacheMode, CacheStore, CachedSource};
use crate::data_source::TerminalSource;
use crate::http_client::HttpAuth;
use crate::throttling::Throttle;
use crate::{AppConfig, CoreError, SourceId};

/// Configuration plus the terminal source every command handler receives.
#[derive(Clone)]
pub struct AppState {
    config: AppConfig,
    source: Arc<dyn TerminalSource>,
    cached: Option<CachedSource>,
}

impl AppState {
    /// Wraps `source` with a response cache sized from `config`. A zero TTL
    /// leaves the source uncached.
    pub fn new(config: AppConfig, source: Arc<dyn TerminalSource>) -> Self {
        if config.cache_ttl_secs == 0 {
            return Self::uncached(config, source);
        }
        let cached = CachedSource::new(
            source,
            CacheStore::new(config.cache_ttl(), config.cache_capacity),
        );
        Self {
            config,
            source: Arc::new(cached.clone()),
            cached: Some(cached),
        }
    }

    pub fn uncached(config: AppConfig, source: Arc<dyn TerminalSource>) -> Self {
        Self {
            config,
            source,
            cached: None,
        }
    }

    /// Builds the gateway adapter described by `config`.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let url = config
            .gateway_url
            .clone()
            .ok_or_else(|| CoreError::Config(String::from(
                "no terminal gateway configured; set IDXLENS_GATEWAY_URL or pass --gateway/--fixture",
            )))?;
        let auth = config
            .gateway_token
            .clone()
            .map(HttpAuth::BearerToken)
            .unwrap_or_default();
        let adapter = GatewayAdapter::new(url)
            .with_auth(auth)
            .with_timeout_ms(config.timeout_ms)
            .with_throttle(Throttle::per_minute(config.rate_per_minute));
        Ok(Self::new(config, Arc::new(adapter)))
    }

    /// Same source and cache, different cache mode.
    pub fn with_cache_mode(self, mode: CacheMode) -> Self {
        match self.cached {
            Some(cached) => {
                let cached = cached.with_mode(mode);
                Self {
                    config: self.config,
                    source: Arc::new(cached.clone()),
                    cached: Some(cached),
                }
            }
            None => self,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn TerminalSource {
        self.source.as_ref()
    }

    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    /// Responses served from the cache so far.
    pub fn cache_hits(&self) -> usize {
        self.cached.as_ref().map(CachedSource::hits).unwrap_or(0)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("source", &self.source.id())
            .field("cached", &self.cached.is_some())
            .finish()
    }
}
