//! Shared application state

use std::sync::Arc;

use libcrosscast::broadcast::create_platforms;
use libcrosscast::config::Config;
use libcrosscast::db::Database;
use libcrosscast::files::FileStore;
use libcrosscast::platforms::linkedin::LinkedinClient;
use libcrosscast::platforms::rss::RssTarget;
use libcrosscast::platforms::twitter::TwitterClient;
use libcrosscast::Broadcaster;
use tracing::warn;

/// Everything the handlers need. Clones are cheap; the heavy parts sit
/// behind Arcs or pools.
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub files: FileStore,
    /// Feed renderer; present when the rss section is enabled.
    pub rss: Option<Arc<RssTarget>>,
    /// OAuth flow endpoints talk to these directly, outside a broadcast.
    pub twitter: Option<Arc<TwitterClient>>,
    pub linkedin: Option<Arc<LinkedinClient>>,
    /// Targets used when a broadcast request names none.
    pub default_targets: Vec<String>,
}

impl AppState {
    /// Build the full adapter set plus the flow clients the OAuth
    /// endpoints need. Adapter construction failures are logged by
    /// `create_platforms` and surface as 503 outcomes per target.
    pub async fn new(config: &Config, db: Database, files: FileStore) -> Self {
        let platforms = create_platforms(config, &db, &files).await;
        let broadcaster = Arc::new(Broadcaster::new(platforms, db.clone(), files.clone()));

        let rss = config
            .rss
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| Arc::new(RssTarget::new(c, &config.server.public_url, db.clone(), files.clone())));

        let twitter = config
            .twitter
            .as_ref()
            .filter(|c| c.enabled)
            .and_then(
                |c| match TwitterClient::from_config(c, db.clone(), files.clone()) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        warn!("Twitter OAuth endpoints disabled: {}", e);
                        None
                    }
                },
            );

        let linkedin = config
            .linkedin
            .as_ref()
            .filter(|c| c.enabled)
            .and_then(
                |c| match LinkedinClient::from_config(c, db.clone(), files.clone()) {
                    Ok(client) => Some(Arc::new(client)),
                    Err(e) => {
                        warn!("LinkedIn OAuth endpoints disabled: {}", e);
                        None
                    }
                },
            );

        Self {
            broadcaster,
            files,
            rss,
            twitter,
            linkedin,
            default_targets: config.defaults.targets.clone(),
        }
    }
}
