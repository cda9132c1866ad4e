//! Output formats for discovered feeds

mod opml;

pub use opml::output_opml;
