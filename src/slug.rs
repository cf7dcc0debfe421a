use std::sync::LazyLock;

use regex::Regex;

/// Runs of anything that is not a letter or digit (underscores included).
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\W_]+").expect("separator pattern is valid"));

/// Derive the URL slug for a name: lowercased, separator runs collapsed to a
/// single hyphen, no leading or trailing hyphen. `None` in, `None` out.
pub fn slugify(text: Option<&str>) -> Option<String> {
    let text = text?;
    let lowered = text.trim().to_lowercase();
    Some(SEPARATORS.replace_all(&lowered, "-").trim_matches('-').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_is_dropped() {
        assert_eq!(slugify(Some("Football Club!")).as_deref(), Some("football-club"));
    }

    #[test]
    fn separator_runs_collapse() {
        assert_eq!(slugify(Some(" A--B ")).as_deref(), Some("a-b"));
        assert_eq!(slugify(Some("Over_/_Under 2.5")).as_deref(), Some("over-under-2-5"));
    }

    #[test]
    fn missing_name_has_no_slug() {
        assert_eq!(slugify(None), None);
    }

    #[test]
    fn unicode_letters_survive() {
        assert_eq!(slugify(Some("Coupe de France Fémin")).as_deref(), Some("coupe-de-france-fémin"));
    }

    #[test]
    fn all_separators_yield_empty_slug() {
        assert_eq!(slugify(Some("--!!--")).as_deref(), Some(""));
    }
}
