use serde::Serialize;

/// Characters of context kept on each side of a match.
pub const CONTEXT_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub preview: String,
}

/// Lowercased chars of `text`, each paired with the index of the original
/// char it came from. One char may lowercase to several (`İ` to `i̇`).
fn fold(text: &[char]) -> (Vec<char>, Vec<usize>) {
    let mut folded = Vec::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len());
    for (i, c) in text.iter().enumerate() {
        for lower in c.to_lowercase() {
            // Final sigma folds like any other sigma.
            folded.push(if lower == 'ς' { 'σ' } else { lower });
            origin.push(i);
        }
    }
    (folded, origin)
}

/// Char range, in `haystack`, of the first case-insensitive occurrence of `query`.
pub fn find_ignore_case(haystack: &[char], query: &[char]) -> Option<(usize, usize)> {
    let (needle, _) = fold(query);
    if needle.is_empty() {
        return Some((0, 0));
    }
    let (folded, origin) = fold(haystack);
    if needle.len() > folded.len() {
        return None;
    }
    let pos = (0..=folded.len() - needle.len())
        .find(|&start| folded[start..start + needle.len()] == needle[..])?;
    Some((origin[pos], origin[pos + needle.len() - 1] + 1))
}

/// Returns a preview around the first match of `query`, or `None` when
/// `content` does not contain it.
pub fn match_preview(content: &str, query: &str) -> Option<String> {
    let chars: Vec<char> = content.chars().collect();
    let needle: Vec<char> = query.chars().collect();
    let (first, last) = find_ignore_case(&chars, &needle)?;

    let start = first.saturating_sub(CONTEXT_CHARS);
    let end = (last + CONTEXT_CHARS).min(chars.len());

    let mut preview = String::new();
    if start > 0 {
        preview.push_str(ELLIPSIS);
    }
    preview.extend(&chars[start..end]);
    if end < chars.len() {
        preview.push_str(ELLIPSIS);
    }
    Some(preview)
}
