//! Tokenizer and recursive-descent parser for the restricted condition grammar
//!
//! The grammar deliberately has no statement forms, function calls, or side
//! effects. It covers variable references (`$params.<name>`, `$env.context`),
//! string/number/bool literals, the six comparison operators, logical
//! combinators (`and`/`or`/`not`, with `&&`/`||`/`!` accepted as aliases),
//! and parenthesized grouping.

use super::value::Value;
use crate::error::{EngineError, Result};

/// Parsed condition AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Variable reference as a dotted path, e.g. `params.env`
    Variable(String),
    Literal(Value),
    Comparison {
        left: Box<Expression>,
        op: ComparisonOp,
        right: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        op: LogicalOp,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Variable(String),
    String(String),
    Number(f64),
    Bool(bool),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    Not,
    LeftParen,
    RightParen,
}

fn parse_error(expr: &str, message: impl AsRef<str>) -> EngineError {
    EngineError::ConditionEvaluation(format!("{} in '{}'", message.as_ref(), expr))
}

/// Parse a condition string into an AST
pub fn parse_expression(input: &str) -> Result<Expression> {
    let mut tokens = tokenize(input)?;
    let expr = parse_logical_or(&mut tokens, input)?;
    if !tokens.is_empty() {
        return Err(parse_error(input, "trailing tokens after expression"));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '$' => {
                chars.next();
                let path = consume_path(&mut chars);
                if path.is_empty() {
                    return Err(parse_error(input, "expected variable path after '$'"));
                }
                tokens.push(Token::Variable(path));
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let literal = consume_until(&mut chars, quote)
                    .ok_or_else(|| parse_error(input, format!("unterminated {quote} string")))?;
                tokens.push(Token::String(literal));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LeftParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RightParen);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Comparison(ComparisonOp::NotEqual));
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Comparison(ComparisonOp::Equal));
                } else {
                    return Err(parse_error(input, "expected '==' for equality"));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Comparison(ComparisonOp::GreaterThanOrEqual));
                } else {
                    tokens.push(Token::Comparison(ComparisonOp::GreaterThan));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Comparison(ComparisonOp::LessThanOrEqual));
                } else {
                    tokens.push(Token::Comparison(ComparisonOp::LessThan));
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::Logical(LogicalOp::And));
                } else {
                    return Err(parse_error(input, "expected '&&' for logical AND"));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Logical(LogicalOp::Or));
                } else {
                    return Err(parse_error(input, "expected '||' for logical OR"));
                }
            }
            _ if ch.is_ascii_digit() || ch == '-' => {
                let number = consume_number(&mut chars)
                    .ok_or_else(|| parse_error(input, "invalid number literal"))?;
                tokens.push(Token::Number(number));
            }
            _ if ch.is_ascii_alphabetic() => {
                let word = consume_word(&mut chars);
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "and" => tokens.push(Token::Logical(LogicalOp::And)),
                    "or" => tokens.push(Token::Logical(LogicalOp::Or)),
                    "not" => tokens.push(Token::Not),
                    other => {
                        return Err(parse_error(input, format!("unexpected word '{other}'")))
                    }
                }
            }
            other => {
                return Err(parse_error(input, format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

fn consume_path(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut path = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
            path.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    path
}

fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}

fn consume_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<f64> {
    let mut text = String::new();
    if chars.peek() == Some(&'-') {
        text.push('-');
        chars.next();
    }
    let mut seen_dot = false;
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_digit() {
            text.push(ch);
            chars.next();
        } else if ch == '.' && !seen_dot {
            seen_dot = true;
            text.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    text.parse().ok()
}

fn consume_word(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut word = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    word
}

// Precedence, loosest first: or, and, comparison, unary.

fn parse_logical_or(tokens: &mut Vec<Token>, input: &str) -> Result<Expression> {
    let mut left = parse_logical_and(tokens, input)?;
    while matches!(tokens.first(), Some(Token::Logical(LogicalOp::Or))) {
        tokens.remove(0);
        let right = parse_logical_and(tokens, input)?;
        left = Expression::Logical {
            left: Box::new(left),
            op: LogicalOp::Or,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_logical_and(tokens: &mut Vec<Token>, input: &str) -> Result<Expression> {
    let mut left = parse_comparison(tokens, input)?;
    while matches!(tokens.first(), Some(Token::Logical(LogicalOp::And))) {
        tokens.remove(0);
        let right = parse_comparison(tokens, input)?;
        left = Expression::Logical {
            left: Box::new(left),
            op: LogicalOp::And,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_comparison(tokens: &mut Vec<Token>, input: &str) -> Result<Expression> {
    let left = parse_unary(tokens, input)?;
    if let Some(Token::Comparison(op)) = tokens.first() {
        let op = op.clone();
        tokens.remove(0);
        let right = parse_unary(tokens, input)?;
        return Ok(Expression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_unary(tokens: &mut Vec<Token>, input: &str) -> Result<Expression> {
    if tokens.is_empty() {
        return Err(parse_error(input, "unexpected end of expression"));
    }

    match tokens.remove(0) {
        Token::Not => {
            let inner = parse_unary(tokens, input)?;
            Ok(Expression::Not(Box::new(inner)))
        }
        Token::LeftParen => {
            let inner = parse_logical_or(tokens, input)?;
            if tokens.is_empty() || tokens.remove(0) != Token::RightParen {
                return Err(parse_error(input, "expected closing parenthesis"));
            }
            Ok(inner)
        }
        Token::Variable(path) => Ok(Expression::Variable(path)),
        Token::String(s) => Ok(Expression::Literal(Value::String(s))),
        Token::Number(n) => Ok(Expression::Literal(Value::Number(n))),
        Token::Bool(b) => Ok(Expression::Literal(Value::Bool(b))),
        _ => Err(parse_error(input, "unexpected token")),
    }
}

/// Collect every variable path referenced by an expression.
/// Used by playbook validation to check references against declared parameters.
pub fn collect_variables(expr: &Expression, out: &mut Vec<String>) {
    match expr {
        Expression::Variable(path) => out.push(path.clone()),
        Expression::Literal(_) => {}
        Expression::Comparison { left, right, .. } | Expression::Logical { left, right, .. } => {
            collect_variables(left, out);
            collect_variables(right, out);
        }
        Expression::Not(inner) => collect_variables(inner, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_comparison() {
        let tokens = tokenize("$params.env == 'prod'").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Variable("params.env".to_string()));
        assert_eq!(tokens[1], Token::Comparison(ComparisonOp::Equal));
        assert_eq!(tokens[2], Token::String("prod".to_string()));
    }

    #[test]
    fn tokenize_word_operators() {
        let tokens = tokenize("$params.a and not $params.b or true").unwrap();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[1], Token::Logical(LogicalOp::And));
        assert_eq!(tokens[2], Token::Not);
        assert_eq!(tokens[4], Token::Logical(LogicalOp::Or));
    }

    #[test]
    fn parse_simple_variable() {
        let expr = parse_expression("$params.flag").unwrap();
        assert!(matches!(expr, Expression::Variable(ref p) if p == "params.flag"));
    }

    #[test]
    fn parse_comparison_expr() {
        let expr = parse_expression("$params.count >= 3").unwrap();
        assert!(matches!(expr, Expression::Comparison { .. }));
    }

    #[test]
    fn parse_grouping_and_precedence() {
        let expr = parse_expression("($params.a or $params.b) and $env.context == 'prod'").unwrap();
        // Top node must be the AND once the OR is grouped
        assert!(
            matches!(expr, Expression::Logical { op: LogicalOp::And, .. }),
            "expected top-level and, got {expr:?}"
        );
    }

    #[test]
    fn parse_not_symbol_and_word() {
        assert!(matches!(
            parse_expression("!$params.flag").unwrap(),
            Expression::Not(_)
        ));
        assert!(matches!(
            parse_expression("not $params.flag").unwrap(),
            Expression::Not(_)
        ));
    }

    #[test]
    fn parse_rejects_trailing_tokens() {
        assert!(parse_expression("$params.a == 1 $params.b").is_err());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_expression("$params.a ==").is_err());
        assert!(parse_expression("($params.a").is_err());
        assert!(parse_expression("$params.a = 1").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn collects_variable_references() {
        let expr = parse_expression("$params.a > 1 and not $env.context == 'dev'").unwrap();
        let mut vars = Vec::new();
        collect_variables(&expr, &mut vars);
        assert_eq!(vars, vec!["params.a".to_string(), "env.context".to_string()]);
    }
}
