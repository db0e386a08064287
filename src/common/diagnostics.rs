//! Post-hoc diagnostics for rejected SAML messages (spec §7).
//!
//! Every error surfaced to a caller is associated, via a log tag, with a file dump of
//! the offending XML so it can be inspected later. The dump is keyed by a monotonic
//! high-precision timestamp so concurrent failures never collide.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Writes `raw` to `{dir}/{unix_nanos}-{tag}.xml` and logs the path at `warn` level.
/// Failures to write the dump are logged but never escalate — diagnostics must not
/// turn a handled error into an unhandled one.
pub fn dump_xml(dir: &Path, tag: &str, raw: &[u8]) -> Option<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let safe_tag: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    let path = dir.join(format!("{nanos}-{safe_tag}.xml"));

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("failed to create diagnostics dir {:?}: {}", parent, e);
            return None;
        }
    }

    match std::fs::write(&path, raw) {
        Ok(()) => {
            warn!(tag = %tag, dump = %path.display(), "rejected SAML message dumped for diagnosis");
            Some(path)
        }
        Err(e) => {
            warn!("failed to write diagnostics dump {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_file_under_the_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dump_xml(dir.path(), "verify/digest-mismatch", b"<a/>").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"<a/>");
    }
}
