use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// Outputs match when they are equal after trimming whitespace at both ends of
/// the whole text. Inner whitespace and case still count.
pub fn outputs_match(expected: &str, actual: &str) -> bool {
    expected.trim() == actual.trim()
}

/// Reduce an uploaded file name to something safe to join onto a directory.
pub fn secure_filename(name: &str) -> String {
    // 1. drop anything outside ASCII
    let ascii: String = name.chars().filter(char::is_ascii).collect();

    // 2. path separators become whitespace, whitespace runs become underscores
    let joined = ascii
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    // 3. strip the rest, then leading/trailing dots and underscores
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// First `max_chars` characters of `text`, for log lines and notices.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_match_trims_only_the_ends() {
        assert!(outputs_match(" hi\n", "hi"));
        assert!(outputs_match("line1\nline2\n", "line1\nline2\n"));
        assert!(!outputs_match("hi\n", "Hi\n"));
        assert!(!outputs_match("a  b", "a b"));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool file.txt"), "My_cool_file.txt");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\input 1.txt"), "C_Users_me_input_1.txt");
        assert_eq!(secure_filename("résumé.txt"), "rsum.txt");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn test_preview_counts_characters() {
        assert_eq!(preview("héllo world", 5), "héllo");
        assert_eq!(preview("short", 50), "short");
    }
}
