//! URL handling for feedscout
//!
//! Canonicalization of seed inputs and discovered hrefs, plus the
//! query-aware keys used by the duplicate filter.

mod normalize;

pub use normalize::{
    dedupe_key, normalize_href, normalize_seed, origin_of, origin_root, remove_www,
};
