//! Profile-URL canonicalization.
//!
//! Leads arrive from two ingestion sources and from webhook payloads, each
//! formatting the same profile URL differently (mobile subdomain, tracking
//! query parameters, percent-encoded or accented slugs, stray slashes). The
//! canonical form is used purely as a matching key, never for display.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Apex domain of the professional network. URLs on any other domain are
/// not profile URLs and canonicalize to `None`.
const NETWORK_APEX: &str = "linkedin.com";

/// Host prefixes that alias the apex domain.
const HOST_ALIASES: &[&str] = &["www.", "m."];

/// Canonicalizes a raw profile URL into a deterministic matching key.
///
/// Returns `None` for empty input, unparseable URLs, and URLs outside the
/// professional-network domain. Never panics. Idempotent:
/// `canonicalize_profile_url(canonicalize_profile_url(x))` equals the inner
/// result for every input.
pub fn canonicalize_profile_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = Url::parse(&with_scheme).ok()?;

    let host = parsed.host_str()?.to_ascii_lowercase();
    let mut apex = host.as_str();
    for alias in HOST_ALIASES {
        if let Some(stripped) = apex.strip_prefix(alias) {
            apex = stripped;
            break;
        }
    }
    if apex != NETWORK_APEX {
        return None;
    }

    // Percent-decode before segmenting so encoded slugs and literal slugs
    // fold to the same key. Invalid sequences keep the raw path.
    let path = match urlencoding::decode(parsed.path()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => parsed.path().to_string(),
    };

    // Splitting on '/' and dropping empties collapses duplicate slashes and
    // the trailing slash in one pass.
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();

    if segments.len() >= 2 && segments[0].eq_ignore_ascii_case("in") {
        // Only the profile slug is a stable identity; trailing segments such
        // as /details/experience are discarded.
        let slug = fold_segment(segments[1]);
        return Some(format!("https://{NETWORK_APEX}/in/{slug}"));
    }

    if segments.is_empty() {
        return Some(format!("https://{NETWORK_APEX}"));
    }

    let folded: Vec<String> = segments.iter().map(|segment| fold_segment(segment)).collect();
    Some(format!("https://{NETWORK_APEX}/{}", folded.join("/")))
}

/// Unicode-folds one path segment: NFD decomposition, combining marks
/// stripped, lowercased.
fn fold_segment(segment: &str) -> String {
    segment.nfd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}
