//! Parameter names derived from the source text of an expression.

pub const MAX_INFERRED_NAME_LEN: usize = 64;

const NOISE_PREFIXES: [&str; 5] = ["&", "*", "mut ", "self.", "get_"];

/// Derive an identifier from expression text such as `&self.get_user_id()`.
///
/// Returns an empty string when nothing usable remains; callers then fall
/// back to a positional name.
pub fn infer_name(expression: &str) -> String {
    let mut rest = expression.trim();
    loop {
        let stripped = NOISE_PREFIXES
            .iter()
            .find_map(|prefix| rest.strip_prefix(prefix))
            .map(str::trim_start);
        match stripped {
            Some(next) => rest = next,
            None => break,
        }
    }

    let mut name: String = rest
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_INFERRED_NAME_LEN)
        .collect();

    match name.chars().next() {
        Some(first) if first.is_ascii_digit() => String::new(),
        Some(first) if first.is_ascii_lowercase() => {
            name.replace_range(..1, &first.to_ascii_uppercase().to_string());
            name
        }
        _ => name,
    }
}

/// Base name for a temporary table built from an expression.
pub fn temporary_table_base(expression: &str) -> String {
    let name = infer_name(expression);
    if name.is_empty() {
        "TempTable".to_string()
    } else {
        name
    }
}
