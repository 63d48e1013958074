//! Export rendering and feed redistribution.
//!
//! # Submodules
//!
//! - [`render`]: picks a template for each archived item and renders the
//!   presentation-facing [`crate::models::ExportedItem`]
//! - [`rss`]: writes a collection's export table as an RSS 2.0 file
//!
//! # Output Structure
//!
//! ```text
//! store_folder/
//! └── headlines.feed.json   # export table (see crate::store)
//!
//! feed_output_dir/
//! └── headlines.xml         # RSS 2.0
//! ```

pub mod render;
pub mod rss;
