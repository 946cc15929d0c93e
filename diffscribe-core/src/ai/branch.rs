// branch naming - deterministic derivation from a valid commit subject

use super::repair::parse_subject;

pub const MAX_BRANCH_LENGTH: usize = 60;

fn kebab(text: &str) -> String {
    let mut out = String::new();
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// derive `type/scope-description` from a subject that parses; the result is
/// lowercase kebab, path-safe and capped at a segment boundary
pub fn branch_name_from_subject(subject: &str, max_length: usize) -> Option<String> {
    let parsed = parse_subject(subject)?;
    let mut slug = match &parsed.scope {
        Some(scope) => format!("{}-{}", kebab(scope), kebab(&parsed.description)),
        None => kebab(&parsed.description),
    };
    if slug.is_empty() {
        return None;
    }

    let budget = max_length.saturating_sub(parsed.ctype.len() + 1);
    if slug.len() > budget {
        let cut = slug[..budget].rfind('-').unwrap_or(budget);
        slug.truncate(cut.max(1));
        slug = slug.trim_end_matches('-').to_string();
    }
    Some(format!("{}/{}", parsed.ctype, slug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_from_scoped_subject() {
        let name =
            branch_name_from_subject("feat(api): add exponential backoff", MAX_BRANCH_LENGTH);
        assert_eq!(name.as_deref(), Some("feat/api-add-exponential-backoff"));
    }

    #[test]
    fn test_branch_is_path_safe_and_capped() {
        let subject = "refactor(core): rename WidgetStore to WidgetCache across the board";
        let name = branch_name_from_subject(subject, 40).unwrap();
        assert!(name.len() <= 40);
        assert!(name.starts_with("refactor/"));
        assert!(!name.contains(' '));
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn test_branch_fails_without_grammar() {
        assert!(branch_name_from_subject("free-form words", MAX_BRANCH_LENGTH).is_none());
    }
}
