//! RSS feed target
//!
//! The one target that publishes inward: `create_post` persists the post
//! and the feed endpoint renders stored posts as RSS 2.0. Image uploads
//! surface as enclosures pointing at the file store's public URLs.

use async_trait::async_trait;
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ItemBuilder};

use crate::config::RssConfig;
use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::Platform;
use crate::types::{Post, PostRequest, PostResponse};

/// Posts served per feed render.
const FEED_LIMIT: usize = 50;

pub struct RssTarget {
    title: String,
    description: String,
    public_url: String,
    db: Database,
    files: FileStore,
}

impl RssTarget {
    pub fn new(config: &RssConfig, public_url: &str, db: Database, files: FileStore) -> Self {
        Self {
            title: config.title.clone(),
            description: config.description.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
            db,
            files,
        }
    }

    pub fn feed_url(&self) -> String {
        format!("{}/api/rss/feed", self.public_url)
    }

    /// Render the stored posts as RSS 2.0 XML, newest first.
    pub async fn build_feed(&self) -> Result<String> {
        let posts = self.db.list_posts(FEED_LIMIT).await?;

        let mut items = Vec::with_capacity(posts.len());
        for post in &posts {
            items.push(self.build_item(post).await?);
        }

        let channel = ChannelBuilder::default()
            .title(self.title.clone())
            .link(self.public_url.clone())
            .description(self.description.clone())
            .items(items)
            .build();

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
            channel
        ))
    }

    async fn build_item(&self, post: &Post) -> Result<rss::Item> {
        let pub_date = chrono::DateTime::from_timestamp(post.created_at, 0)
            .ok_or_else(|| {
                PlatformError::Internal(format!(
                    "Post {} carries an unrepresentable timestamp",
                    post.id
                ))
            })?
            .to_rfc2822();

        let mut builder = ItemBuilder::default();
        builder
            .description(Some(post.content.clone()))
            .guid(Some(
                GuidBuilder::default()
                    .value(post.id.clone())
                    .permalink(false)
                    .build(),
            ))
            .pub_date(Some(pub_date));

        if let Some(link) = &post.link {
            builder.link(Some(link.clone()));
        }

        // RSS items carry a single enclosure; the first image wins.
        if let Some(upload_id) = post.images.first() {
            let upload = self.files.get(upload_id).await?;
            builder.enclosure(Some(
                EnclosureBuilder::default()
                    .url(self.files.public_url(upload_id))
                    .length(upload.byte_size.to_string())
                    .mime_type(upload.mime_type.as_str().to_string())
                    .build(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Platform for RssTarget {
    fn name(&self) -> &str {
        "rss"
    }

    fn character_limit(&self) -> Option<usize> {
        None
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        self.validate_request(request)?;

        let post = Post::from_request(request);
        self.db.create_post(&post).await?;

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id: post.id,
            remote_url: Some(self.feed_url()),
        })
    }
}
