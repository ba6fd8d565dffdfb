use sha2::{Digest, Sha256};
use tracing::warn;

use outreach_common::Candidate;

/// Prefix of identities derived from a candidate URL.
pub const URL_ID_PREFIX: &str = "url:";

/// Give `candidate` a stable identity. Driver-supplied ids are kept as-is;
/// otherwise the id is a hash of the URL without query or fragment. A
/// candidate with neither is dropped.
pub fn ensure_id(mut candidate: Candidate) -> Option<Candidate> {
    if !candidate.id.trim().is_empty() {
        return Some(candidate);
    }

    let Some(canonical) = canonical_url(&candidate.url) else {
        warn!(author = %candidate.author, "Dropping candidate with no id and no url");
        return None;
    };

    candidate.id = format!(
        "{URL_ID_PREFIX}{}",
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );
    Some(candidate)
}

/// URL with query string and fragment stripped. Unparseable URLs are used
/// verbatim (trimmed).
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            Some(parsed.as_str().trim_end_matches('/').to_string())
        }
        Err(_) => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, url: &str) -> Candidate {
        serde_json::from_value(serde_json::json!({ "id": id, "url": url })).unwrap()
    }

    #[test]
    fn driver_id_is_kept() {
        let c = ensure_id(candidate("urn:li:activity:1", "https://x.test/p/1")).unwrap();
        assert_eq!(c.id, "urn:li:activity:1");
    }

    #[test]
    fn missing_id_is_derived_from_url_ignoring_tracking_params() {
        let a = ensure_id(candidate("", "https://x.test/in/jane?miniProfileUrn=abc")).unwrap();
        let b = ensure_id(candidate("  ", "https://x.test/in/jane/#about")).unwrap();
        assert!(a.id.starts_with(URL_ID_PREFIX));
        assert_eq!(a.id.len(), URL_ID_PREFIX.len() + 64);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_urls_get_different_ids() {
        let a = ensure_id(candidate("", "https://x.test/in/jane")).unwrap();
        let b = ensure_id(candidate("", "https://x.test/in/john")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn no_id_and_no_url_is_dropped() {
        assert!(ensure_id(candidate("", "   ")).is_none());
    }
}
