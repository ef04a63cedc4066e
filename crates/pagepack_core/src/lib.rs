//! Pagepack core: pure harvest/rewrite/pack logic with no IO.
mod config;
mod cssref;
mod kind;
mod normalize;
mod paths;
mod progress;

pub use config::JobConfiguration;
pub use cssref::{css_urls, font_face_sources, rewrite_urls, CssUrls};
pub use kind::ResourceKind;
pub use normalize::{normalize, NormalizeError, Normalized};
pub use paths::{page_file_name, relativize, PathAssigner, PathPolicy};
pub use progress::{ProgressState, ARCHIVE_SHARE, CATEGORY_SHARE};
