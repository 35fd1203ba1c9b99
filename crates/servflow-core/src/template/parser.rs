//! Lexer, parser and evaluator for template actions.
//!
//! The grammar mirrors the subset of the classic text-template language the
//! engine actually uses: an action is a pipeline of commands separated by
//! `|`; a command is a function name followed by argument terms, or a bare
//! term; terms are dotted fields, literals, or parenthesized pipelines.

use super::{is_truthy, lookup_path, unknown_function, Scope};
use crate::error::{Error, Result};
use serde_json::Value;

/// One parsed chunk of a template.
pub(super) enum Node {
    /// Literal text copied through verbatim
    Text(String),
    /// A `{{ ... }}` action
    Action(Pipeline),
}

/// A sequence of commands joined by `|`.
pub(super) struct Pipeline {
    commands: Vec<Command>,
}

/// A function invocation or bare term.
pub(super) struct Command {
    /// Function name; `None` for a bare term
    func: Option<String>,
    args: Vec<Term>,
}

/// An argument position in a command.
pub(super) enum Term {
    /// `.a.b.c` (empty path = whole scope)
    Field(Vec<String>),
    /// Quoted string literal
    Str(String),
    /// Numeric literal
    Num(f64),
    /// `true` / `false`
    Bool(bool),
    /// `( pipeline )`
    Sub(Pipeline),
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Split template source into text and action nodes.
pub(super) fn parse(src: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut rest = src;
    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            nodes.push(Node::Text(rest[..start].to_string()));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| Error::template(format!("unclosed action in template: {src:?}")))?;
        let expr = &after[..end];
        nodes.push(Node::Action(parse_pipeline_str(expr)?));
        rest = &after[end + CLOSE.len()..];
    }
    if !rest.is_empty() {
        nodes.push(Node::Text(rest.to_string()));
    }
    Ok(nodes)
}

fn parse_pipeline_str(expr: &str) -> Result<Pipeline> {
    let tokens = lex(expr)?;
    let mut pos = 0;
    let pipeline = parse_pipeline(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(Error::template(format!("unexpected token in action: {expr:?}")));
    }
    Ok(pipeline)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(Vec<String>),
    Ident(String),
    Str(String),
    Num(f64),
    Pipe,
    LParen,
    RParen,
}

fn lex(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            '.' => {
                let (path, next) = lex_field(&chars, i);
                tokens.push(Token::Field(path));
                i = next;
            }
            c if c == '-' || c.is_ascii_digit() => {
                let (n, next) = lex_number(&chars, i)?;
                tokens.push(Token::Num(n));
                i = next;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::template(format!(
                    "unexpected character {other:?} in action {expr:?}"
                )))
            }
        }
    }
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            '"' => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(Error::template("unterminated string literal in action"))
}

fn lex_field(chars: &[char], start: usize) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    let mut i = start;
    while i < chars.len() && chars[i] == '.' {
        i += 1;
        let seg_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        if i > seg_start {
            path.push(chars[seg_start..i].iter().collect());
        }
    }
    (path, i)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize)> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, i))
        .map_err(|_| Error::template(format!("invalid number literal {text:?}")))
}

fn parse_pipeline(tokens: &[Token], pos: &mut usize) -> Result<Pipeline> {
    let mut commands = vec![parse_command(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::Pipe)) {
        *pos += 1;
        commands.push(parse_command(tokens, pos)?);
    }
    Ok(Pipeline { commands })
}

fn parse_command(tokens: &[Token], pos: &mut usize) -> Result<Command> {
    match tokens.get(*pos) {
        Some(Token::Ident(name)) if name != "true" && name != "false" => {
            let name = name.clone();
            *pos += 1;
            let mut args = Vec::new();
            while let Some(term) = try_parse_term(tokens, pos)? {
                args.push(term);
            }
            Ok(Command { func: Some(name), args })
        }
        _ => {
            let term = try_parse_term(tokens, pos)?
                .ok_or_else(|| Error::template("empty command in action"))?;
            Ok(Command { func: None, args: vec![term] })
        }
    }
}

fn try_parse_term(tokens: &[Token], pos: &mut usize) -> Result<Option<Term>> {
    let term = match tokens.get(*pos) {
        Some(Token::Field(path)) => Term::Field(path.clone()),
        Some(Token::Str(s)) => Term::Str(s.clone()),
        Some(Token::Num(n)) => Term::Num(*n),
        Some(Token::Ident(word)) if word == "true" => Term::Bool(true),
        Some(Token::Ident(word)) if word == "false" => Term::Bool(false),
        Some(Token::LParen) => {
            *pos += 1;
            let inner = parse_pipeline(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    return Ok(Some(Term::Sub(inner)));
                }
                _ => return Err(Error::template("missing closing parenthesis in action")),
            }
        }
        _ => return Ok(None),
    };
    *pos += 1;
    Ok(Some(term))
}

/// Evaluate a pipeline: each command's result is appended as the final
/// argument of the next.
pub(super) fn eval_pipeline(pipeline: &Pipeline, scope: &Scope<'_>) -> Result<Value> {
    let mut piped: Option<Value> = None;
    for command in &pipeline.commands {
        piped = Some(eval_command(command, piped, scope)?);
    }
    piped.ok_or_else(|| Error::template("empty pipeline"))
}

fn eval_command(command: &Command, piped: Option<Value>, scope: &Scope<'_>) -> Result<Value> {
    let mut args: Vec<Value> = command
        .args
        .iter()
        .map(|t| eval_term(t, scope))
        .collect::<Result<_>>()?;
    if let Some(v) = piped {
        args.push(v);
    }
    match &command.func {
        Some(name) => match name.as_str() {
            "and" => Ok(Value::Bool(args.iter().all(is_truthy))),
            "or" => Ok(Value::Bool(args.iter().any(is_truthy))),
            "not" => Ok(Value::Bool(!args.first().is_some_and(is_truthy))),
            _ => {
                let func = scope.funcs.get(name).ok_or_else(|| unknown_function(name))?;
                func(&args)
            }
        },
        None => args
            .into_iter()
            .next()
            .ok_or_else(|| Error::template("empty command in action")),
    }
}

fn eval_term(term: &Term, scope: &Scope<'_>) -> Result<Value> {
    match term {
        Term::Field(path) => Ok(lookup_path(scope.vars, path)),
        Term::Str(s) => Ok(Value::String(s.clone())),
        Term::Num(n) => Ok(number_value(*n)),
        Term::Bool(b) => Ok(Value::Bool(*b)),
        Term::Sub(inner) => eval_pipeline(inner, scope),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_mixed_tokens() {
        let tokens = lex(r#"eq .age "18""#).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Ident("eq".to_string()));
        assert_eq!(tokens[1], Token::Field(vec!["age".to_string()]));
        assert_eq!(tokens[2], Token::Str("18".to_string()));
    }

    #[test]
    fn lexes_negative_numbers() {
        let tokens = lex("-3.5").unwrap();
        assert_eq!(tokens, vec![Token::Num(-3.5)]);
    }

    #[test]
    fn lexes_escaped_string() {
        let tokens = lex(r#""a\"b\nc""#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\"b\nc".to_string())]);
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(lex("{{ %%% }}").is_err());
    }

    #[test]
    fn splits_text_and_actions() {
        let nodes = parse("a {{ .x }} b").unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[0], Node::Text(t) if t == "a "));
        assert!(matches!(&nodes[1], Node::Action(_)));
        assert!(matches!(&nodes[2], Node::Text(t) if t == " b"));
    }

    #[test]
    fn nested_parens_parse() {
        assert!(parse_pipeline_str("or (and (eq .a .b) (eq .c .d)) (eq .e .f)").is_ok());
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse_pipeline_str(".a .b").is_err());
    }
}
