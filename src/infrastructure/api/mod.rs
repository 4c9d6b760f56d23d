pub mod catalog;
pub mod token;

/// Join url segments without doubling separators.
pub fn build_url(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::build_url;

    #[test]
    fn build_url_joins_cleanly() {
        assert_eq!(
            build_url(&["https://api.example.com/", "videos", "12"]),
            "https://api.example.com/videos/12"
        );
        assert_eq!(build_url(&["https://api.example.com", ""]), "https://api.example.com");
    }
}
