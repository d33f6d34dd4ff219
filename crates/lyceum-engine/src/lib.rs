pub mod policy;
pub mod service;
pub mod unread;

pub use policy::{CreatorOnly, DeletePolicy};
pub use service::DiscussionService;
pub use unread::UnreadIndex;
