//! Metadata sidecar locations.
//!
//! Attributes for a canonical path live under `<root>/.meta/<hex>/<components>`.
//! Only the location is defined for now; nothing reads or writes sidecars yet,
//! but the layout is fixed so stored attributes stay addressable.

use crate::canonical::CanonicalPath;

/// Directory name under each backing root that holds sidecars.
pub const META_DIR: &str = ".meta";

/// Sidecar path for `canonical`, under the same backing root.
pub fn metadata_path_for(canonical: &CanonicalPath) -> String {
    let base = canonical.base();
    let relative = canonical.relative();
    let mut out = String::with_capacity(base.len() + 1 + META_DIR.len() + relative.len());
    out.push_str(base);
    out.push('/');
    out.push_str(META_DIR);
    out.push_str(relative);
    out
}
