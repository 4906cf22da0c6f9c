use uuid::Uuid;

/// Ids referenced by `#<id>` tokens in `content`, in order of first appearance.
///
/// A token runs from `#` over ASCII alphanumerics, `-` and `_`. Tokens that do
/// not parse as an id are skipped.
pub fn extract_mention_ids(content: &str) -> Vec<Uuid> {
    let mut ids = Vec::new();

    for (start, _) in content.match_indices('#') {
        let token: &str = {
            let rest = &content[start + 1..];
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(rest.len());
            &rest[..end]
        };

        if token.is_empty() {
            continue;
        }

        if let Ok(id) = Uuid::try_parse(token) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    ids
}
