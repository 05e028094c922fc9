//! Spine export version accepted by the loaders.

use crate::Error;

/// Major.minor of the exports this runtime understands.
pub const SPINE_EXPORT_VERSION: &str = "3.8";

/// A 3.8.75 export is known to be broken and is refused like any other version.
const REJECTED_PATCH: &str = "3.8.75";

/// Accepts `3.8` and any `3.8.x` except `3.8.75`.
pub fn check_spine_version(value: &str) -> Result<(), Error> {
    let value = value.trim();
    let supported = match value.strip_prefix(SPINE_EXPORT_VERSION) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    };
    if !supported || value == REJECTED_PATCH {
        return Err(Error::UnsupportedVersion {
            value: value.to_string(),
        });
    }
    Ok(())
}
