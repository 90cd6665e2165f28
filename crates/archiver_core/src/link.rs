use url::Url;

/// Canonical form of a post link used for deduplication and cache addressing.
///
/// Lowercases the whole link, drops query and fragment, and strips trailing
/// slashes so that `https://X.substack.com/p/post/?utm=1` and
/// `https://x.substack.com/p/post` collapse to the same value.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let mut normalized = match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string().to_lowercase()
        }
        Err(_) => trimmed.to_lowercase(),
    };
    while normalized.ends_with('/') && !normalized.ends_with("://") {
        normalized.pop();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::normalize_link;

    #[test]
    fn unparseable_links_are_still_lowercased_and_trimmed() {
        assert_eq!(normalize_link("  Not A Url/ "), "not a url");
    }

    #[test]
    fn bare_origin_keeps_scheme() {
        assert_eq!(normalize_link("https://Example.com/"), "https://example.com");
    }
}
