//! Request routing.
//!
//! Routes are checked in priority order and the first match wins:
//!
//! 1. caching disabled by the kill-switch: pass-through
//! 2. dev-server hot-update requests: pass-through
//! 3. ignore patterns (hostname or path contains the pattern): pass-through
//! 4. exact match on a configured event-stream path: [`StreamCacheProxy`]
//! 5. anything else: pass-through

use std::sync::Arc;

use reqwest::Url;
use swcache_core::{AppConfig, ControlMessage, Error, ProxyContext};

use crate::fetch::{StreamRequest, Upstream};
use crate::lifetime::Lifetime;
use crate::proxy::{ProxyResponse, StreamCacheProxy};

const HOT_UPDATE_MARKER: &str = "hot-update";

/// Routing decision for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Disabled,
    HotUpdate,
    Ignored,
    EventStream,
    Unmatched,
}

#[derive(Clone)]
pub struct Dispatcher {
    context: ProxyContext,
    upstream: Arc<dyn Upstream>,
    proxy: StreamCacheProxy,
    ignore: Vec<String>,
}

impl Dispatcher {
    pub async fn new(context: ProxyContext, upstream: Arc<dyn Upstream>, config: &AppConfig) -> Result<Self, Error> {
        let proxy = StreamCacheProxy::open(context.db(), upstream.clone(), config.sse.clone()).await?;
        Ok(Self { context, upstream, proxy, ignore: config.ignore.patterns.clone() })
    }

    pub fn context(&self) -> &ProxyContext {
        &self.context
    }

    pub fn proxy(&self) -> &StreamCacheProxy {
        &self.proxy
    }

    pub fn route(&self, url: &Url) -> Route {
        if !self.context.is_enabled() {
            return Route::Disabled;
        }

        let path = url.path();
        if path.contains(HOT_UPDATE_MARKER) {
            return Route::HotUpdate;
        }

        let host = url.host_str().unwrap_or("");
        if self.ignore.iter().any(|p| host.contains(p.as_str()) || path.contains(p.as_str())) {
            return Route::Ignored;
        }

        if self.proxy.config().matches_path(path) {
            return Route::EventStream;
        }

        Route::Unmatched
    }

    pub async fn dispatch(&self, lifetime: &Lifetime, request: StreamRequest) -> Result<ProxyResponse, Error> {
        match self.route(&request.url) {
            Route::EventStream => self.proxy.handle(lifetime, request).await,
            route => {
                tracing::debug!(url = %request.url, ?route, "passing request through");
                let response = self.upstream.fetch(&request).await?;
                Ok(ProxyResponse::passthrough(response))
            }
        }
    }

    /// Apply a management message to the shared context.
    pub async fn control(&self, message: ControlMessage) {
        self.context.apply(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ResponseSource;
    use crate::testing::ScriptedUpstream;
    use swcache_core::{CacheDb, SseConfig};
    use swcache_core::config::IgnoreConfig;

    fn config() -> AppConfig {
        AppConfig {
            sse: SseConfig { routes: vec!["/api/events".into()], ..Default::default() },
            ignore: IgnoreConfig { patterns: vec!["analytics.".into(), "/private/".into()] },
            ..Default::default()
        }
    }

    async fn dispatcher(upstream: ScriptedUpstream) -> Dispatcher {
        let db = CacheDb::open_in_memory().await.unwrap();
        Dispatcher::new(ProxyContext::new(db, true), Arc::new(upstream), &config()).await.unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn routes_in_priority_order() {
        let d = dispatcher(ScriptedUpstream::new()).await;

        assert_eq!(d.route(&url("https://app.test/api/events")), Route::EventStream);
        assert_eq!(d.route(&url("https://app.test/api/events?x=1")), Route::EventStream);
        assert_eq!(d.route(&url("https://app.test/api/events/sub")), Route::Unmatched);
        assert_eq!(d.route(&url("https://app.test/main.hot-update.json")), Route::HotUpdate);
        assert_eq!(d.route(&url("https://analytics.app.test/api/events")), Route::Ignored);
        assert_eq!(d.route(&url("https://app.test/private/api/events")), Route::Ignored);

        d.control(ControlMessage::UpdateSwEnabled { enabled: false }).await;
        assert_eq!(d.route(&url("https://app.test/api/events")), Route::Disabled);
    }

    #[tokio::test]
    async fn disabled_requests_are_not_recorded() {
        let upstream = ScriptedUpstream::new().stream("https://app.test/api/events", &["data: x\n\n"]);
        let d = dispatcher(upstream).await;
        d.context().set_enabled(false);

        let lifetime = Lifetime::new();
        let request = StreamRequest::parse("https://app.test/api/events").unwrap();
        let response = d.dispatch(&lifetime, request).await.unwrap();
        assert_eq!(response.source, ResponseSource::Passthrough);

        lifetime.settle().await;
        assert!(d.proxy().partition().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn passthrough_failure_is_not_replayed() {
        let upstream = ScriptedUpstream::new().fail("https://app.test/other", "down");
        let d = dispatcher(upstream).await;

        let request = StreamRequest::parse("https://app.test/other").unwrap();
        let err = d.dispatch(&Lifetime::new(), request).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
