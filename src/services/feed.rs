//! Read-side projections over published posts.
//!
//! Everything here is derived from the posts table on demand. Drafts are
//! invisible to every query in this module; ordering is always newest
//! publication first.

use crate::config::SiteConfig;
use crate::db::post_repo;
use crate::error::{AppError, Result};
use crate::models::{Post, SiteStats};
use sqlx::PgPool;

#[derive(Clone)]
pub struct FeedProjector {
    pool: PgPool,
    site: SiteConfig,
}

impl FeedProjector {
    pub fn new(pool: PgPool, site: SiteConfig) -> Self {
        Self { pool, site }
    }

    /// Most recent published posts for the landing page.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Post>> {
        Ok(post_repo::list_published(&self.pool, limit, 0).await?)
    }

    /// Paginated publication history, newest first.
    pub async fn archive(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        Ok(post_repo::list_published(&self.pool, limit, offset).await?)
    }

    /// Case-insensitive substring search over title and content of
    /// published posts. Blank queries return the empty set rather than
    /// the whole archive.
    pub async fn search(&self, query: &str) -> Result<Vec<Post>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(post_repo::search_published(&self.pool, needle).await?)
    }

    /// Published post by slug. Drafts 404 here even with a correct slug.
    pub async fn published_by_slug(&self, slug: &str) -> Result<Post> {
        let post = post_repo::find_post_by_slug(&self.pool, slug)
            .await?
            .filter(Post::is_published)
            .ok_or_else(|| AppError::NotFound(format!("post {}", slug)))?;
        Ok(post)
    }

    pub async fn stats(&self) -> Result<SiteStats> {
        Ok(post_repo::get_stats(&self.pool).await?)
    }

    /// RSS 2.0 document for the newest published posts.
    pub async fn rss(&self, limit: i64) -> Result<String> {
        let posts = post_repo::list_published(&self.pool, limit, 0).await?;
        Ok(render_rss(&self.site, &posts))
    }
}

/// Render an RSS 2.0 channel. Item guids are the immutable slugs, flagged
/// as non-permalink so readers treat them as opaque identifiers.
pub fn render_rss(site: &SiteConfig, posts: &[Post]) -> String {
    let base = site.base_url.trim_end_matches('/');

    let mut xml = String::with_capacity(1024 + posts.len() * 512);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\">\n<channel>\n");
    xml.push_str(&format!("<title>{}</title>\n", xml_escape(&site.title)));
    xml.push_str(&format!("<link>{}</link>\n", xml_escape(base)));
    xml.push_str(&format!(
        "<description>{}</description>\n",
        xml_escape(&site.description)
    ));

    for post in posts {
        let published_at = match post.published_at {
            Some(ts) => ts,
            // Defensive filter: never let a draft leak into the feed.
            None => continue,
        };

        xml.push_str("<item>\n");
        xml.push_str(&format!("<title>{}</title>\n", xml_escape(&post.title)));
        xml.push_str(&format!(
            "<link>{}/post/{}</link>\n",
            xml_escape(base),
            xml_escape(&post.slug)
        ));
        xml.push_str(&format!(
            "<guid isPermaLink=\"false\">{}</guid>\n",
            xml_escape(&post.slug)
        ));
        xml.push_str(&format!(
            "<pubDate>{}</pubDate>\n",
            published_at.to_rfc2822()
        ));
        xml.push_str(&format!(
            "<description>{}</description>\n",
            xml_escape(&post.content)
        ));
        xml.push_str("</item>\n");
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostStatus;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn site() -> SiteConfig {
        SiteConfig {
            title: "the-planet-mars.org".to_string(),
            base_url: "https://the-planet-mars.org".to_string(),
            description: "Research & field notes".to_string(),
        }
    }

    fn post(title: &str, slug: &str) -> Post {
        Post {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slug.to_string(),
            content: "<p>Soil samples & spectra</p>".to_string(),
            media_key: Some("soil.jpg".to_string()),
            media_kind: Some("image".to_string()),
            tags: vec!["geology".to_string()],
            status: PostStatus::Published.as_str().to_string(),
            views: 3,
            likes: 1,
            created_at: Utc::now(),
            published_at: Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()),
        }
    }

    #[test]
    fn escapes_markup_in_every_text_field() {
        let xml = render_rss(&site(), &[post("Dust <Storms> & You", "dust-storms")]);

        assert!(xml.contains("<title>Dust &lt;Storms&gt; &amp; You</title>"));
        assert!(xml.contains("&lt;p&gt;Soil samples &amp; spectra&lt;/p&gt;"));
        assert!(xml.contains("<description>Research &amp; field notes</description>"));
    }

    #[test]
    fn items_carry_slug_guid_and_rfc2822_date() {
        let xml = render_rss(&site(), &[post("Sol 4100", "sol-4100")]);

        assert!(xml.contains("<guid isPermaLink=\"false\">sol-4100</guid>"));
        assert!(xml.contains("<link>https://the-planet-mars.org/post/sol-4100</link>"));
        assert!(xml.contains("<pubDate>Sat, 14 Mar 2026 09:30:00 +0000</pubDate>"));
    }

    #[test]
    fn drafts_never_render_as_items() {
        let mut draft = post("Unfinished", "unfinished");
        draft.status = PostStatus::Draft.as_str().to_string();
        draft.published_at = None;

        let xml = render_rss(&site(), &[draft]);
        assert!(!xml.contains("<item>"));
    }

    #[test]
    fn empty_feed_is_still_a_valid_channel() {
        let xml = render_rss(&site(), &[]);
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<channel>"));
        assert!(xml.ends_with("</channel>\n</rss>\n"));
    }
}
