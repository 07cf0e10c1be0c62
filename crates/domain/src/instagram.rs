//! Instagram URL classification.
//!
//! Content-scoped services must target a specific post or reel; a bare
//! profile link is not a valid target for them. Profile-wide services target
//! the account itself.

use store::ContentType;

/// First path segments that are site pages rather than usernames.
const RESERVED_SEGMENTS: &[&str] = &[
    "explore",
    "accounts",
    "about",
    "developer",
    "directory",
    "legal",
    "stories",
];

/// Markers that introduce a content shortcode in the path.
fn marker_type(segment: &str) -> Option<ContentType> {
    match segment {
        "p" => Some(ContentType::Post),
        "reel" | "reels" | "tv" => Some(ContentType::Reel),
        _ => None,
    }
}

/// Splits an instagram.com URL into its path segments.
///
/// Returns `None` for URLs pointing anywhere else.
fn path_segments(url: &str) -> Option<Vec<&str>> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let mut parts = rest.splitn(2, '/');
    let host = parts.next()?;
    if !host.eq_ignore_ascii_case("instagram.com") {
        return None;
    }

    let path = parts.next().unwrap_or("");
    let path = path.split(['?', '#']).next().unwrap_or("");
    Some(path.split('/').filter(|segment| !segment.is_empty()).collect())
}

/// Finds the content marker and shortcode in a segment list.
///
/// Handles both the canonical `/p/{code}` form and the username-prefixed
/// `/{username}/p/{code}` form.
fn content_marker(segments: &[&str]) -> Option<(ContentType, String)> {
    for (index, segment) in segments.iter().enumerate() {
        let Some(kind) = marker_type(segment) else {
            continue;
        };
        if let Some(code) = segments.get(index + 1)
            && !code.is_empty()
        {
            return Some((kind, (*code).to_string()));
        }
        // A marker with no code following it is a listing page, not content.
        return None;
    }
    None
}

/// The username when the segments form a plain profile path.
fn profile_segment<'a>(segments: &[&'a str]) -> Option<&'a str> {
    match segments {
        &[single] if marker_type(single).is_none() && !RESERVED_SEGMENTS.contains(&single) => {
            Some(single)
        }
        _ => None,
    }
}

/// Returns true if `url` points at instagram.com at all.
pub fn is_instagram_url(url: &str) -> bool {
    path_segments(url).is_some()
}

/// Returns true if `url` is a profile page rather than a specific post or
/// reel. Non-Instagram URLs are never bare profiles.
pub fn is_bare_profile_url(url: &str) -> bool {
    match path_segments(url) {
        Some(segments) => segments.is_empty() || profile_segment(&segments).is_some(),
        None => false,
    }
}

/// Extracts the shortcode from a post or reel URL.
pub fn content_code(url: &str) -> Option<String> {
    content_marker(&path_segments(url)?).map(|(_, code)| code)
}

/// Classifies a URL as post, reel or profile.
///
/// Returns `None` for non-Instagram URLs and for Instagram pages that are
/// neither content nor a profile.
pub fn classify(url: &str) -> Option<ContentType> {
    let segments = path_segments(url)?;
    if let Some((kind, _)) = content_marker(&segments) {
        return Some(kind);
    }
    profile_segment(&segments).map(|_| ContentType::Profile)
}

/// Extracts the username from a bare profile URL.
pub fn profile_username(url: &str) -> Option<String> {
    let segments = path_segments(url)?;
    profile_segment(&segments).map(|username| username.to_string())
}
