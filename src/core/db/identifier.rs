/// Identifier Guard Module
///
/// Table and column names cannot be bound as statement parameters, so every
/// identifier that reaches SQL text passes through this module first:
/// names of existing objects are matched against an allowlist fetched from
/// the live schema, new names must satisfy a conservative grammar, and all of
/// them are double-quoted when rendered.
use crate::core::{DashError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identifier accepted for new tables and columns.
pub const MAX_IDENTIFIER_LEN: usize = 64;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

// Type names such as INT, VARCHAR(255), DECIMAL(10, 2), DOUBLE PRECISION, UNSIGNED BIG INT.
static TYPE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\s+[A-Za-z][A-Za-z0-9_]*)*(\s*\(\s*[+-]?\d+\s*(,\s*[+-]?\d+\s*)?\))?$")
        .expect("type name pattern")
});

/// Checks the syntax of a name for an object that is about to be created.
pub fn validate_new_identifier(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(DashError::Identifier("name must not be empty".to_string()));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DashError::Identifier(format!(
            "'{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(DashError::Identifier(format!(
            "'{}' may only contain letters, digits and underscores and must not start with a digit",
            name
        )));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(DashError::Identifier(format!(
            "'{}' uses the reserved sqlite_ prefix",
            name
        )));
    }
    Ok(name)
}

/// Checks a declared column type against the type-name grammar.
pub fn validate_type_name(type_name: &str) -> Result<&str> {
    let trimmed = type_name.trim();
    if TYPE_NAME.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(DashError::schema(format!("malformed column type '{}'", type_name)))
    }
}

/// Rejects raw definition fragments that could smuggle in extra statements or
/// hide text behind comments, and maps the MySQL `AUTO_INCREMENT` spelling to
/// SQLite's `AUTOINCREMENT`.
pub fn sanitize_fragment(fragment: &str) -> Result<String> {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        return Err(DashError::schema("column definition must not be empty"));
    }
    for forbidden in [";", "--", "/*"] {
        if trimmed.contains(forbidden) {
            return Err(DashError::Identifier(format!(
                "column definition must not contain '{}'",
                forbidden
            )));
        }
    }
    static AUTO_INCREMENT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bAUTO_INCREMENT\b").expect("auto increment pattern"));
    Ok(AUTO_INCREMENT.replace_all(trimmed, "AUTOINCREMENT").into_owned())
}

/// Double-quotes an identifier for use in statement text.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Resolves `candidate` against a list of names fetched from the live schema.
///
/// SQLite compares identifiers case-insensitively, so the match is too; the
/// canonical spelling from the allowlist is returned.
pub fn resolve<'a, I>(candidate: &str, allowlist: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    allowlist
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(candidate))
        .map(str::to_string)
}
