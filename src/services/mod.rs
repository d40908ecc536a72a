//! Business logic layer.

pub mod counters;
pub mod dispatch;
pub mod feed;
pub mod media;
pub mod posts;
pub mod subscribers;

pub use counters::CounterService;
pub use dispatch::{MailTransport, NotificationDispatcher, SmtpMailer};
pub use feed::FeedProjector;
pub use media::{MediaValidator, ObjectStore, S3ObjectStore};
pub use posts::{NewPost, PostService, UpdatePost};
pub use subscribers::SubscriberService;
