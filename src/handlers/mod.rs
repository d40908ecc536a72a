//! HTTP handlers.
//!
//! Public routes serve the published site: recent posts, archive, search,
//! RSS, subscriptions, counters. Admin routes sit behind the bearer-token
//! middleware and drive the full draft lifecycle.

pub mod auth;
pub mod batches;
pub mod media;
pub mod posts;
pub mod public;
pub mod subscribers;

pub use auth::login;
pub use batches::{
    get_batch_summary, list_batch_recipients, list_post_batches, redispatch_batch,
};
pub use media::presign_upload;
pub use posts::{
    create_post, delete_post, get_post, list_posts, publish_post, unpublish_post, update_post,
};
pub use public::{
    get_archive, get_published_post, get_recent, get_rss, get_stats, like_post, search_posts,
    subscribe, unsubscribe,
};
pub use subscribers::list_subscribers;
