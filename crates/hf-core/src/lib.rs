//! hf-core: shared identifiers, media state, errors, configuration, and the
//! lifecycle event bus.
//!
//! Every other hf-* crate depends on this one. Failures are funnelled into
//! [`Error`], which knows its own HTTP status so the server can translate it
//! at the request boundary.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

pub use error::{Error, Result};
pub use ids::MediaId;
pub use media::{parse_segment_name, segment_file_name, MediaState, MediaStatus, MANIFEST_FILE};
