//! Canonical URL form for dedup.
//!
//! Two result URLs are the same page when they differ only in host case,
//! a trailing slash, or tracking query parameters.

/// Query parameters that identify campaigns, not content.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "igshid", "ref", "ref_src", "mc_cid", "mc_eid", "msclkid",
];

/// Canonicalize a URL: lowercase scheme and host, drop the trailing slash
/// and fragment, strip tracking parameters. Anything unparseable is
/// returned trimmed as-is.
pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return trimmed.to_owned();
    };

    // Fragment never survives canonicalization.
    let rest = rest.split('#').next().unwrap_or(rest);

    let (authority_and_path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    let (host, path) = match authority_and_path.split_once('/') {
        Some((h, p)) => (h, format!("/{p}")),
        None => (authority_and_path, String::new()),
    };

    let path = if path.len() > 1 {
        path.trim_end_matches('/').to_owned()
    } else {
        // "/" alone collapses to empty, matching the no-path form.
        String::new()
    };

    let kept_params: Vec<&str> = match query {
        Some(q) => q
            .split('&')
            .filter(|pair| !pair.is_empty() && !is_tracking_param(pair))
            .collect(),
        None => Vec::new(),
    };

    let mut canonical = format!(
        "{}://{}{}",
        scheme.to_lowercase(),
        host.to_lowercase(),
        path
    );
    if !kept_params.is_empty() {
        canonical.push('?');
        canonical.push_str(&kept_params.join("&"));
    }
    canonical
}

fn is_tracking_param(pair: &str) -> bool {
    let name = pair.split('=').next().unwrap_or(pair).to_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_case_and_trailing_slash_collapse() {
        assert_eq!(
            canonicalize("https://Example.com/a/"),
            canonicalize("https://example.com/a")
        );
    }

    #[test]
    fn tracking_params_are_stripped() {
        assert_eq!(
            canonicalize("https://example.com/a?utm_source=x&utm_medium=y"),
            "https://example.com/a"
        );
        assert_eq!(
            canonicalize("https://example.com/a?gclid=123"),
            "https://example.com/a"
        );
    }

    #[test]
    fn content_params_survive() {
        assert_eq!(
            canonicalize("https://example.com/search?q=rust&utm_campaign=z"),
            "https://example.com/search?q=rust"
        );
    }

    #[test]
    fn case_slash_and_tracking_variants_collapse_to_one() {
        let a = canonicalize("https://Example.com/a/");
        let b = canonicalize("https://example.com/a");
        let c = canonicalize("https://example.com/a?utm_source=x");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, "https://example.com/a");
    }

    #[test]
    fn path_case_is_preserved() {
        assert_ne!(
            canonicalize("https://example.com/Page"),
            canonicalize("https://example.com/page")
        );
    }

    #[test]
    fn fragment_is_dropped() {
        assert_eq!(
            canonicalize("https://example.com/a#section-2"),
            "https://example.com/a"
        );
    }

    #[test]
    fn bare_host_and_root_path_match() {
        assert_eq!(
            canonicalize("https://example.com"),
            canonicalize("https://example.com/")
        );
    }

    #[test]
    fn unparseable_input_passes_through() {
        assert_eq!(canonicalize("  not a url  "), "not a url");
    }
}
