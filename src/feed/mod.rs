//! Feed discovery: validation, link filtering, site metadata, and scoring

pub mod dates;
mod feed_info;
pub mod link_filter;
pub mod score;
pub mod site_meta;
pub mod validator;

pub use feed_info::{Favicon, FeedFormat, FeedInfo, SiteMeta};
pub use link_filter::LinkFilter;
