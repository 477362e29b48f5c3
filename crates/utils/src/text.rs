/// Derive the git branch name for a task: `task-<id>-<slug>`.
///
/// The slug is the lowercased title truncated to 50 characters with spaces
/// collapsed to `-` and everything outside `[a-z0-9-]` dropped.
pub fn task_branch_name(task_id: i64, title: &str) -> String {
    format!("task-{}-{}", task_id, slugify(title, 50))
}

pub fn slugify(input: &str, max_len: usize) -> String {
    input
        .to_lowercase()
        .chars()
        .take(max_len)
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_from_title() {
        assert_eq!(task_branch_name(42, "Fix login bug"), "task-42-fix-login-bug");
    }

    #[test]
    fn slug_drops_punctuation_and_truncates() {
        assert_eq!(slugify("Add OAuth2 (Google!)", 50), "add-oauth2-google");
        let long = "a".repeat(80);
        assert_eq!(slugify(&long, 50).len(), 50);
    }

    #[test]
    fn slug_of_unicode_title_keeps_ascii_only() {
        assert_eq!(slugify("Déploiement préproduction", 50), "dploiement-prproduction");
    }
}
