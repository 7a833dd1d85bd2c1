//! Id expressions: `${field}` templates resolved against a document
//!
//! An expression is scanned once, front to back, into a list of segments.
//! Substituted values are never rescanned, so a field value that itself
//! contains `${` is emitted verbatim.

use serde_json::Value;

use crate::error::{ExprError, json_type_name};

const OPEN: &str = "${";
const CLOSE: char = '}';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed id expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdExpression {
    source: String,
    segments: Vec<Segment>,
}

impl IdExpression {
    /// Parse an expression, failing on an unterminated `${`.
    ///
    /// The whole expression is parsed before any field is looked up, so an
    /// unterminated placeholder is reported even when an earlier placeholder
    /// names a field the document lacks.
    pub fn parse(expr: &str) -> Result<Self, ExprError> {
        let mut segments = Vec::new();
        let mut rest = expr;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| ExprError::Malformed {
                expr: expr.to_string(),
            })?;
            segments.push(Segment::Field(after_open[..end].to_string()));
            rest = &after_open[end + CLOSE.len_utf8()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: expr.to_string(),
            segments,
        })
    }

    /// Field names referenced by the expression, in order of appearance
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the expression against a document
    pub fn render(&self, document: &Value) -> Result<String, ExprError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(&self.field_text(name, document)?),
            }
        }
        Ok(out)
    }

    fn field_text(&self, name: &str, document: &Value) -> Result<String, ExprError> {
        let value = document
            .as_object()
            .and_then(|obj| obj.get(name))
            .ok_or_else(|| ExprError::FieldNotFound {
                field: name.to_string(),
                expr: self.source.clone(),
            })?;

        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
            other => Err(ExprError::TypeMismatch {
                field: name.to_string(),
                expr: self.source.clone(),
                found: json_type_name(other),
            }),
        }
    }
}

/// Evaluate `expr` against `document` in one step
pub fn evaluate(expr: &str, document: &Value) -> Result<String, ExprError> {
    IdExpression::parse(expr)?.render(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitutes_string_and_integer() {
        let id = evaluate("${a}-${b}", &json!({"a": "x", "b": 1})).unwrap();
        assert_eq!(id, "x-1");
    }

    #[test]
    fn test_literal_text_is_copied_verbatim() {
        let doc = json!({"id": 42});
        assert_eq!(evaluate("user/${id}/v1", &doc).unwrap(), "user/42/v1");
        assert_eq!(evaluate("no placeholders }", &doc).unwrap(), "no placeholders }");
        assert_eq!(evaluate("$id", &doc).unwrap(), "$id");
    }

    #[test]
    fn test_empty_expression_yields_empty_id() {
        assert_eq!(evaluate("", &json!({})).unwrap(), "");
    }

    #[test]
    fn test_missing_field() {
        let err = evaluate("${missing}", &json!({})).unwrap_err();
        assert_eq!(
            err,
            ExprError::FieldNotFound {
                field: "missing".to_string(),
                expr: "${missing}".to_string(),
            }
        );
    }

    #[test]
    fn test_unterminated_placeholder() {
        let err = evaluate("${a", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ExprError::Malformed { .. }));

        let err = evaluate("${a}-${b", &json!({"a": 1, "b": 2})).unwrap_err();
        assert!(matches!(err, ExprError::Malformed { .. }));
    }

    #[test]
    fn test_malformed_takes_precedence_over_missing_field() {
        let err = evaluate("${missing}-${b", &json!({"b": 2})).unwrap_err();
        assert_eq!(
            err,
            ExprError::Malformed {
                expr: "${missing}-${b".to_string(),
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = evaluate("${a}", &json!({"a": [1, 2]})).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { found: "array", .. }));

        for (value, found) in [
            (json!({"k": 1}), "object"),
            (json!(1.5), "float"),
            (json!(true), "boolean"),
            (json!(null), "null"),
        ] {
            let err = evaluate("${a}", &json!({ "a": value })).unwrap_err();
            assert_eq!(
                err,
                ExprError::TypeMismatch {
                    field: "a".to_string(),
                    expr: "${a}".to_string(),
                    found,
                }
            );
        }
    }

    #[test]
    fn test_negative_and_large_integers() {
        assert_eq!(evaluate("${n}", &json!({"n": -5})).unwrap(), "-5");
        assert_eq!(
            evaluate("${n}", &json!({"n": u64::MAX})).unwrap(),
            u64::MAX.to_string()
        );
    }

    #[test]
    fn test_substitution_is_not_recursive() {
        let doc = json!({"a": "${b}", "b": "nope"});
        assert_eq!(evaluate("${a}", &doc).unwrap(), "${b}");
    }

    #[test]
    fn test_non_object_document_has_no_fields() {
        let err = evaluate("${a}", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ExprError::FieldNotFound { .. }));
        assert_eq!(evaluate("fixed", &json!("scalar")).unwrap(), "fixed");
    }

    #[test]
    fn test_fields_lists_references_in_order() {
        let expr = IdExpression::parse("${b}:${a}:${b}").unwrap();
        assert_eq!(expr.fields().collect::<Vec<_>>(), vec!["b", "a", "b"]);
        assert_eq!(expr.as_str(), "${b}:${a}:${b}");
    }

    #[test]
    fn test_parsed_expression_is_reusable() {
        let expr = IdExpression::parse("${k}").unwrap();
        assert_eq!(expr.render(&json!({"k": "one"})).unwrap(), "one");
        assert_eq!(expr.render(&json!({"k": "two"})).unwrap(), "two");
    }
}
