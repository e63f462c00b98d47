//! Sender allow/block list matching.
//!
//! Entries are matched case-insensitively and support glob-style `*`
//! wildcards, so `admin_*` or `*bot` work as expected.

/// Returns `true` when `candidate` matches at least one pattern.
pub fn matches_any(candidate: &str, patterns: &[String]) -> bool {
    let lower = candidate.to_lowercase();
    patterns.iter().any(|pattern| {
        let pat = pattern.trim_start_matches('@').to_lowercase();
        glob_match(&pat, &lower)
    })
}

/// Check a sender against an allow-list.
///
/// An empty allow-list admits everyone; a non-empty one is exclusive.
pub fn is_allowed(identities: &[&str], allowlist: &[String]) -> bool {
    allowlist.is_empty() || identities.iter().any(|id| matches_any(id, allowlist))
}

/// Check a sender against a block-list. An empty list blocks nobody.
pub fn is_blocked(identities: &[&str], blocklist: &[String]) -> bool {
    identities.iter().any(|id| matches_any(id, blocklist))
}

/// `*` matches any run of characters, including none.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    let head = segments.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(head) else {
        return false;
    };
    let mut inner: Vec<&str> = segments.collect();
    let Some(tail) = inner.pop() else {
        return rest.is_empty();
    };
    for segment in inner.into_iter().filter(|s| !s.is_empty()) {
        match rest.find(segment) {
            Some(at) => rest = &rest[at + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(tail)
}
