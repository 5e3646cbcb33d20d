//! SQL string helpers shared by the store and the projection storage.

/// Quotes a SQL identifier for safe interpolation into statements.
///
/// Doubles embedded quote characters, so the result is a single valid
/// identifier regardless of input.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifiers() {
        assert_eq!(quote_identifier("events_orders"), "\"events_orders\"");
    }

    #[test]
    fn doubles_embedded_quotes() {
        assert_eq!(quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }
}
