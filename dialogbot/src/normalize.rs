/// Lowercases `text`, drops everything that is not an ASCII letter, digit or
/// whitespace, and trims the result.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    cleaned.trim().to_owned()
}
