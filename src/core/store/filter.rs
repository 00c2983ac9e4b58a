//! Filter expression parsing for `query`.
//!
//! Grammar the core emits:
//! ```text
//! expr  := eq | in
//! eq    := IDENT "==" STRING_LITERAL
//! in    := IDENT "in" "[" STRING_LITERAL ("," STRING_LITERAL)* "]"
//! ```
//! String literals take single or double quotes.

use crate::core::error::{Error, Result};
use crate::core::store::VectorDocument;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Empty expression: matches everything.
    All,
    Eq(String, String),
    In(String, Vec<String>),
}

impl FilterExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(FilterExpr::All);
        }

        if let Some((field, rest)) = split_once_token(expr, "==") {
            let value = parse_string_literal(rest)
                .ok_or_else(|| Error::UnsupportedFilter(expr.to_string()))?;
            return Ok(FilterExpr::Eq(field.to_string(), value));
        }

        if let Some((field, rest)) = split_once_token(expr, " in ") {
            let rest = rest.trim();
            let inner = rest
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(|| Error::UnsupportedFilter(expr.to_string()))?;
            let mut values = Vec::new();
            for part in inner.split(',') {
                let value = parse_string_literal(part)
                    .ok_or_else(|| Error::UnsupportedFilter(expr.to_string()))?;
                values.push(value);
            }
            if values.is_empty() {
                return Err(Error::UnsupportedFilter(expr.to_string()));
            }
            return Ok(FilterExpr::In(field.to_string(), values));
        }

        Err(Error::UnsupportedFilter(expr.to_string()))
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self, FilterExpr::All)
    }

    pub fn matches(&self, document: &VectorDocument) -> bool {
        match self {
            FilterExpr::All => true,
            FilterExpr::Eq(field, value) => {
                field_value(document, field).map(|v| v == *value).unwrap_or(false)
            }
            FilterExpr::In(field, values) => field_value(document, field)
                .map(|v| values.iter().any(|candidate| *candidate == v))
                .unwrap_or(false),
        }
    }
}

fn field_value(document: &VectorDocument, field: &str) -> Option<String> {
    match field {
        "id" => Some(document.id.clone()),
        "relativePath" => Some(document.relative_path.clone()),
        "fileExtension" => Some(document.file_extension.clone()),
        "startLine" => Some(document.start_line.to_string()),
        "endLine" => Some(document.end_line.to_string()),
        _ => None,
    }
}

fn split_once_token<'a>(expr: &'a str, token: &str) -> Option<(&'a str, &'a str)> {
    let idx = expr.find(token)?;
    let field = expr[..idx].trim();
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((field, &expr[idx + token.len()..]))
}

fn parse_string_literal(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')))?;
    Some(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, ext: &str) -> VectorDocument {
        VectorDocument {
            id: "id-1".to_string(),
            dense_vector: vec![],
            sparse_vector: None,
            content: String::new(),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 2,
            file_extension: ext.to_string(),
            metadata: String::new(),
        }
    }

    #[test]
    fn parses_eq_with_both_quote_styles() {
        assert_eq!(
            FilterExpr::parse("relativePath == 'b.py'").unwrap(),
            FilterExpr::Eq("relativePath".into(), "b.py".into())
        );
        assert_eq!(
            FilterExpr::parse("fileExtension == \".rs\"").unwrap(),
            FilterExpr::Eq("fileExtension".into(), ".rs".into())
        );
    }

    #[test]
    fn parses_in_lists() {
        assert_eq!(
            FilterExpr::parse("fileExtension in ['.ts', '.py']").unwrap(),
            FilterExpr::In("fileExtension".into(), vec![".ts".into(), ".py".into()])
        );
    }

    #[test]
    fn empty_expression_is_trivial() {
        assert!(FilterExpr::parse("").unwrap().is_trivial());
        assert!(FilterExpr::parse("   ").unwrap().is_trivial());
    }

    #[test]
    fn malformed_expressions_are_unsupported() {
        for bad in [
            "relativePath = 'x'",
            "relativePath == x",
            "fileExtension in []",
            "a b c",
            "relativePath in ('x')",
        ] {
            assert_eq!(
                FilterExpr::parse(bad).unwrap_err().kind(),
                "unsupported_filter",
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn evaluation_matches_fields() {
        let d = doc("src/auth.py", ".py");
        assert!(FilterExpr::parse("relativePath == 'src/auth.py'")
            .unwrap()
            .matches(&d));
        assert!(!FilterExpr::parse("relativePath == 'other.py'")
            .unwrap()
            .matches(&d));
        assert!(FilterExpr::parse("fileExtension in ['.py', '.rs']")
            .unwrap()
            .matches(&d));
        assert!(!FilterExpr::parse("unknownField == 'x'").unwrap().matches(&d));
    }
}
