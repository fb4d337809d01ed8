//! ETag computation for tally views.
//!
//! The tag is a SHA-256 over the view's JSON encoding. Candidate rows are
//! already in a deterministic order, so equal views always hash equally.

use agora_engine::TallyView;
use sha2::{Digest, Sha256};

/// Compute a strong ETag (quoted hex digest) for `view`.
pub fn compute_etag(view: &TallyView) -> Result<String, serde_json::Error> {
  let bytes = serde_json::to_vec(view)?;
  let hash = Sha256::digest(&bytes);
  Ok(format!("\"{}\"", hex::encode(hash)))
}

/// Does an `If-None-Match` header value match `etag`?
///
/// Accepts `*` and comma-separated lists. `W/` prefixes are ignored, as
/// `If-None-Match` uses weak comparison.
pub fn if_none_match(header: &str, etag: &str) -> bool {
  header.split(',').map(str::trim).any(|candidate| {
    candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
  })
}
