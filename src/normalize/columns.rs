/// Canonical column name: trimmed, lowercase, spaces as underscores, and
/// always starting with a letter (`f_` is prepended otherwise).
pub fn normalize_column_name(name: &str) -> String {
    let normalized: String = name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    match normalized.chars().next() {
        Some(c) if c.is_alphabetic() => normalized,
        _ => format!("f_{}", normalized),
    }
}

/// Index of the first alias (in alias order) present among `columns`,
/// compared case-insensitively after normalization.
pub fn resolve_alias(columns: &[String], aliases: &[&str]) -> Option<usize> {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_column_name(c)).collect();

    aliases.iter().find_map(|alias| {
        let alias = normalize_column_name(alias);
        normalized.iter().position(|c| *c == alias)
    })
}
