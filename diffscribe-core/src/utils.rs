use anyhow::Result;

/// fail early with a readable hint when the api key is missing
pub fn check_openrouter_api_key() -> Result<()> {
    if std::env::var("OPENROUTER_API_KEY").is_err() {
        anyhow::bail!(
            "OPENROUTER_API_KEY is not set; export it or add it to a .env file"
        );
    }
    Ok(())
}

/// truncate a string to a maximum length with ellipsis, safe on char boundaries
pub fn truncate_with_ellipsis(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let head: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("a longer sentence", 10), "a longe...");
    }
}
