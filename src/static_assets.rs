//! Embedded frontend assets.
//!
//! The form/list UI is a handful of static files compiled into the binary so
//! the service ships as a single artifact. `debug-embed` keeps the files
//! embedded in debug builds too, which the handler tests rely on.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;
