//! SQL identifier quoting and sanitization utilities.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use sqlassoc_core::quote_ident;
///
/// assert_eq!(quote_ident("books"), "\"books\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Sanitize a SQL identifier by removing non-alphanumeric/underscore characters.
///
/// Use this when quoting is not possible (e.g. PRAGMA arguments).
///
/// ```
/// use sqlassoc_core::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("book_authors"), "book_authors");
/// assert_eq!(sanitize_identifier("x;DROP TABLE--"), "xDROPTABLE");
/// ```
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
