//! Filters registered on the configuration template environment

use minijinja::Value;

/// Quote a string with double quotes, escaping backslashes and quotes
///
/// Usage: {{ endpoint | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = if let Some(str_val) = value.as_str() {
        str_val.to_string()
    } else {
        value.to_string()
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("s3.example.com")), "\"s3.example.com\"");
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(quote(Value::from(42)), "\"42\"");
    }
}
