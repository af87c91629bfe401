use reflink;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Copies a single file using reflink if possible, falling back to standard copy.
///
/// `dst` must not exist yet; reflinking never overwrites.
///
/// # Errors
///
/// Returns an error if both the reflink and the fallback copy fail.
pub fn copy_file_reflink(src: &Path, dst: &Path) -> std::io::Result<()> {
    match reflink::reflink(src, dst) {
        Ok(()) => {
            debug!("Reflinked: {:?} -> {:?}", src, dst);
        }
        Err(e) => {
            debug!(
                "Reflink failed ({}), falling back to copy: {:?} -> {:?}",
                e, src, dst
            );
            fs::copy(src, dst)?;
        }
    }
    Ok(())
}
