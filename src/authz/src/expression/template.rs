//! Expression parsing, validation and rendering

use std::fmt;

use super::context::EvalContext;
use super::error::{ExpressionError, Result};

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Placeholder paths that may never be interpolated
const FORBIDDEN_PATHS: &[&str] = &["user.Permissions"];

/// Validated placeholder path, e.g. `request.Namespace`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    raw: String,
    keys: Vec<String>,
}

impl Path {
    /// Parse and validate a placeholder body
    ///
    /// The body must match `^[a-zA-Z0-9_]+(?:\.[a-zA-Z0-9_]+)*$` and must not
    /// reach into the principal's permission list.
    pub fn parse(raw: &str) -> Result<Self> {
        let well_formed = raw
            .split('.')
            .all(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !well_formed {
            return Err(ExpressionError::InvalidPath {
                path: raw.to_string(),
            });
        }

        let forbidden = FORBIDDEN_PATHS.iter().any(|forbidden| {
            raw == *forbidden
                || raw
                    .strip_prefix(forbidden)
                    .is_some_and(|rest| rest.starts_with('.'))
        });
        if forbidden {
            return Err(ExpressionError::ForbiddenPath {
                path: raw.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            keys: raw.split('.').map(str::to_string).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path keys, root first
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'s> {
    Literal(&'s str),
    Placeholder(&'s str),
}

/// Split a template into literal and placeholder tokens
fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    while let Some(start) = source[offset..].find(OPEN) {
        let open_at = offset + start;
        if open_at > offset {
            tokens.push(Token::Literal(&source[offset..open_at]));
        }

        let body_at = open_at + OPEN.len();
        let Some(len) = source[body_at..].find(CLOSE) else {
            return Err(ExpressionError::Syntax { position: open_at });
        };

        tokens.push(Token::Placeholder(&source[body_at..body_at + len]));
        offset = body_at + len + CLOSE.len_utf8();
    }

    if offset < source.len() {
        tokens.push(Token::Literal(&source[offset..]));
    }

    Ok(tokens)
}

/// A parsed required-permission expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    segments: Vec<Segment>,
}

impl Expression {
    /// Parse and validate an expression
    ///
    /// # Errors
    ///
    /// * [`ExpressionError::Syntax`] for an unclosed `${`
    /// * [`ExpressionError::InvalidPath`] for a placeholder outside the path grammar
    /// * [`ExpressionError::ForbiddenPath`] for `${user.Permissions}`
    pub fn parse(source: &str) -> Result<Self> {
        let segments = tokenize(source)?
            .into_iter()
            .map(|token| match token {
                Token::Literal(text) => Ok(Segment::Literal(text.to_string())),
                Token::Placeholder(body) => Path::parse(body).map(Segment::Placeholder),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Template text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder paths in template order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(path) => Some(path),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder from the context
    ///
    /// The output is a plain comparison string; nothing is escaped.
    pub fn render(&self, ctx: &EvalContext<'_>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(path) => ctx.write_path(path, &mut out),
            }
        }
        out
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Check that an expression may be registered as a rule
pub fn is_valid_expression(expression: &str) -> Result<()> {
    Expression::parse(expression).map(|_| ())
}

/// Raw placeholder bodies in template order, without path validation
pub fn placeholder_keys(template: &str) -> Result<Vec<&str>> {
    Ok(tokenize(template)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Placeholder(body) => Some(body),
            Token::Literal(_) => None,
        })
        .collect())
}

/// Parse and render a template in one call
pub fn render(template: &str, ctx: &EvalContext<'_>) -> Result<String> {
    Ok(Expression::parse(template)?.render(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;

    #[test]
    fn test_placeholder_keys() {
        assert_eq!(placeholder_keys("abc${def}").unwrap(), vec!["def"]);
        assert_eq!(placeholder_keys("abc${def }").unwrap(), vec!["def "]);
        assert_eq!(
            placeholder_keys("abc${def },asdasd{}${zcf}").unwrap(),
            vec!["def ", "zcf"]
        );
        assert!(placeholder_keys("plain:text").unwrap().is_empty());
    }

    #[test]
    fn test_path_grammar() {
        assert!(Path::parse("a.b.c").is_ok());
        assert!(Path::parse("a.b_c.c").is_ok());
        assert!(Path::parse("A1.b2").is_ok());

        for bad in [".a.b.c", " a.b.c", "a..b.c", "a.b/c.c", "a.b.", "", "a-b", "用户.name"] {
            assert_eq!(
                Path::parse(bad),
                Err(ExpressionError::InvalidPath {
                    path: bad.to_string()
                }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_forbidden_paths() {
        assert!(matches!(
            Path::parse("user.Permissions"),
            Err(ExpressionError::ForbiddenPath { .. })
        ));
        assert!(matches!(
            Path::parse("user.Permissions.0"),
            Err(ExpressionError::ForbiddenPath { .. })
        ));
        assert!(Path::parse("user.PermissionsVersion").is_ok());
        assert!(Path::parse("request.Permissions").is_ok());
    }

    #[test]
    fn test_is_valid_expression() {
        assert!(is_valid_expression("app:${request.Namespace}/${request.Name}:get").is_ok());
        assert!(is_valid_expression("no:placeholders:here").is_ok());
        assert!(is_valid_expression("").is_ok());

        assert!(is_valid_expression("app:${user.Permissions}").is_err());
        assert!(is_valid_expression("app:${.request.Name}").is_err());
        assert!(is_valid_expression("app:${request..Name}").is_err());
        assert!(is_valid_expression("app:${request.Na/me}").is_err());
        assert!(is_valid_expression("app:${}").is_err());
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert_eq!(
            Expression::parse("app:${request.Name"),
            Err(ExpressionError::Syntax { position: 4 })
        );
        assert_eq!(
            Expression::parse("app:${a}:${b"),
            Err(ExpressionError::Syntax { position: 9 })
        );
    }

    #[test]
    fn test_nested_placeholder_is_invalid() {
        assert!(matches!(
            Expression::parse("${a${b}}"),
            Err(ExpressionError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_stray_braces_are_literal() {
        let expression = Expression::parse("a{b}$c}").unwrap();
        assert_eq!(expression.paths().count(), 0);
        assert_eq!(expression.render(&EvalContext::new()), "a{b}$c}");
    }

    #[test]
    fn test_render_request_fields() {
        let request = json!({ "Namespace": "test", "Name": "app1" });
        let ctx = EvalContext::new().with_request(&request);

        assert_eq!(
            render("app:${request.Namespace}/${request.Name}.add", &ctx).unwrap(),
            "app:test/app1.add"
        );
    }

    #[test]
    fn test_render_several_expressions() {
        let request = json!({ "Namespace": "test", "Name": "app1" });
        let user = json!({ "Namespace": "dev", "Name": "tom" });
        let ctx = EvalContext::new()
            .with_request(&request)
            .with_user(Cow::Borrowed(&user));

        let rendered: Vec<String> = [
            "app:${request.Namespace}/${request.Name}.add",
            "app:${user.Namespace}/${user.Name}:get",
        ]
        .iter()
        .map(|template| render(template, &ctx).unwrap())
        .collect();

        assert_eq!(rendered, vec!["app:test/app1.add", "app:dev/tom:get"]);
    }

    #[test]
    fn test_render_nested_path() {
        let request = json!({ "aaa": { "bbb": { "ccc": "ddd" } } });
        let ctx = EvalContext::new().with_request(&request);

        assert_eq!(render("abc${request.aaa.bbb.ccc}", &ctx).unwrap(), "abcddd");
    }

    #[test]
    fn test_render_is_not_escaped() {
        let request = json!({ "Name": "<b>&\"x\"" });
        let ctx = EvalContext::new().with_request(&request);

        assert_eq!(render("${request.Name}", &ctx).unwrap(), "<b>&\"x\"");
    }

    #[test]
    fn test_paths_and_display() {
        let expression = Expression::parse("app:${user.Namespace}/${user.Name}:get").unwrap();
        let paths: Vec<&str> = expression.paths().map(Path::as_str).collect();

        assert_eq!(paths, vec!["user.Namespace", "user.Name"]);
        assert_eq!(expression.to_string(), "app:${user.Namespace}/${user.Name}:get");
        assert_eq!(expression.source(), expression.to_string());
    }
}
