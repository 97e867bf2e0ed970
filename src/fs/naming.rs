//! Path component sanitization.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum characters kept from a sanitized component.
const MAX_COMPONENT_CHARS: usize = 80;

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-.]+").expect("component regex is valid"));

/// Turn an author name or post id into a single safe directory name.
///
/// Runs of anything other than word characters, `-` and `.` become `_`.
/// Empty results and names made only of dots become `unknown`.
pub fn sanitize_component(name: &str) -> String {
    let replaced = UNSAFE_RUN.replace_all(name.trim(), "_");
    let truncated: String = replaced.chars().take(MAX_COMPONENT_CHARS).collect();

    if truncated.is_empty() || truncated.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component_keeps_word_characters() {
        assert_eq!(sanitize_component("Dear-迪丽热巴"), "Dear-迪丽热巴");
        assert_eq!(sanitize_component("5270588752661663"), "5270588752661663");
        assert_eq!(sanitize_component("a b/c:d"), "a_b_c_d");
    }

    #[test]
    fn test_sanitize_component_rejects_traversal() {
        assert_eq!(sanitize_component(".."), "unknown");
        assert_eq!(sanitize_component("../etc"), ".._etc");
        assert_eq!(sanitize_component("   "), "unknown");
    }

    #[test]
    fn test_sanitize_component_truncates() {
        let long = "名".repeat(100);
        assert_eq!(sanitize_component(&long).chars().count(), 80);
    }
}
