//! Turning user input into canonical category paths.
//!
//! Users paste either a bare path (`transport/cars/honda`) or whatever URL
//! their browser shows (`https://www.ss.lv/msg/ru/transport/cars/honda/`).
//! Both must end up as the same key in the subscription store.

use url::Url;

use crate::error::InvalidPathError;

/// Second-level label every accepted host must carry (`www.ss.lv`).
const SITE_DOMAIN: &str = "ss";
const SITE_SUFFIXES: &[&str] = &["lv", "com"];
/// Interface language prefixes the site puts in front of category paths.
const LANGUAGES: &[&str] = &["ru", "lv", "en"];

/// A feed path such as `transport/cars/honda`.
pub type Category = String;

/// Normalize a bare path or a site URL into a [`Category`].
pub fn resolve_category_path(input: &str) -> Result<Category, InvalidPathError> {
    let input = input.trim();

    let path = if input.contains("//") {
        let url =
            Url::parse(input).map_err(|_| InvalidPathError::MalformedUrl(input.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| InvalidPathError::MalformedUrl(input.to_string()))?;
        if !is_site_host(host) {
            return Err(InvalidPathError::ForeignDomain(host.to_string()));
        }
        url.path().to_string()
    } else {
        input.to_string()
    };

    let category = normalize(&path);
    if category.is_empty() {
        return Err(InvalidPathError::Empty);
    }
    Ok(category)
}

/// `true` when the host's registrable part is `ss.lv` or `ss.com`.
pub fn is_site_host(host: &str) -> bool {
    let mut labels = host.trim_end_matches('.').rsplit('.');
    let suffix = labels.next().unwrap_or_default().to_ascii_lowercase();
    let domain = labels.next().unwrap_or_default().to_ascii_lowercase();
    domain == SITE_DOMAIN && SITE_SUFFIXES.contains(&suffix.as_str())
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.first() == Some(&"msg") {
        segments.remove(0);
    }
    if segments.first().is_some_and(|s| LANGUAGES.contains(s)) {
        segments.remove(0);
    }
    if segments.last() == Some(&"rss") {
        segments.pop();
    }

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_are_trimmed() {
        assert_eq!(
            resolve_category_path("transport/cars/honda").unwrap(),
            "transport/cars/honda"
        );
        assert_eq!(
            resolve_category_path(" /transport/cars/honda/ ").unwrap(),
            "transport/cars/honda"
        );
        assert_eq!(
            resolve_category_path("msg/transport/cars/honda").unwrap(),
            "transport/cars/honda"
        );
    }

    #[test]
    fn site_urls_are_reduced_to_the_category() {
        for input in [
            "https://www.ss.lv/msg/ru/transport/cars/honda",
            "https://www.ss.lv/ru/transport/cars/honda/",
            "http://ss.com/lv/transport/cars/honda/rss/",
            "https://WWW.SS.LV/en/transport/cars/honda",
        ] {
            assert_eq!(
                resolve_category_path(input).unwrap(),
                "transport/cars/honda",
                "input: {input}"
            );
        }
    }

    #[test]
    fn foreign_domains_are_rejected() {
        assert_eq!(
            resolve_category_path("https://www.example.lv/ru/transport/cars/"),
            Err(InvalidPathError::ForeignDomain("www.example.lv".into()))
        );
        assert!(matches!(
            resolve_category_path("https://www.ss.de/ru/transport/"),
            Err(InvalidPathError::ForeignDomain(_))
        ));
    }

    #[test]
    fn empty_paths_are_rejected() {
        assert_eq!(resolve_category_path(""), Err(InvalidPathError::Empty));
        assert_eq!(resolve_category_path("///"), Err(InvalidPathError::Empty));
        assert_eq!(
            resolve_category_path("https://www.ss.lv/ru/"),
            Err(InvalidPathError::Empty)
        );
    }

    #[test]
    fn malformed_urls_are_rejected() {
        assert!(matches!(
            resolve_category_path("https://"),
            Err(InvalidPathError::MalformedUrl(_))
        ));
    }

    #[test]
    fn host_check_uses_last_two_labels() {
        assert!(is_site_host("www.ss.lv"));
        assert!(is_site_host("ss.com"));
        assert!(!is_site_host("ss.lv.evil.com"));
        assert!(!is_site_host("notss.lv"));
        assert!(!is_site_host("lv"));
    }
}
