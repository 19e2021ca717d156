//! Precedence-climbing parser producing [`Expr`] trees.

use std::rc::Rc;

use super::lexer::{tokenize, Spanned, Token};
use super::{ArrayItem, BinaryOp, Expr, LogicalOp, Property, Segment, UnaryOp};
use crate::error::ParseError;
use crate::value::Value;

type PResult<T> = Result<T, ParseError>;

pub(crate) fn parse(src: &str) -> PResult<Expr> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        src,
    };
    let expr = parser.expression()?;
    if !parser.at(&Token::Eof) {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Split `Hello {state.name}!` into text and code segments.
pub(crate) fn parse_template(src: &str) -> PResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = src.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '{' {
            text.push(c);
            continue;
        }

        let mut depth = 1;
        let mut quote: Option<char> = None;
        let mut end = None;
        for (pos, ch) in chars.by_ref() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' | '`' => quote = Some(ch),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(pos);
                            break;
                        }
                    }
                    _ => {}
                },
            }
        }

        let Some(end) = end else {
            return Err(ParseError {
                message: "unclosed interpolation".into(),
                offset: start,
                text: src.to_string(),
            });
        };

        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }
        let code = &src[start + 1..end];
        segments.push(Segment::Code(parse(code).map_err(|mut e| {
            e.offset += start + 1;
            e.text = src.to_string();
            e
        })?));
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    src: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> PResult<()> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{p}`")))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            offset: self.tokens[self.pos.min(self.tokens.len() - 1)].offset,
            text: self.src.to_string(),
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            _ => Err(self.error("expected identifier")),
        }
    }

    fn expression(&mut self) -> PResult<Expr> {
        if self.arrow_ahead() {
            return self.arrow();
        }
        self.conditional()
    }

    fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Token::Ident(_) => matches!(self.peek_at(1), Token::Punct("=>")),
            Token::Punct("(") => {
                let mut ahead = 1;
                loop {
                    match self.peek_at(ahead) {
                        Token::Ident(_) | Token::Punct(",") => ahead += 1,
                        Token::Punct(")") => {
                            return matches!(self.peek_at(ahead + 1), Token::Punct("=>"))
                        }
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn arrow(&mut self) -> PResult<Expr> {
        let mut params = Vec::new();
        if self.eat("(") {
            while !self.eat(")") {
                params.push(self.ident()?);
                if !self.at_punct(")") {
                    self.expect(",")?;
                }
            }
        } else {
            params.push(self.ident()?);
        }
        self.expect("=>")?;
        let body = self.expression()?;
        Ok(Expr::Arrow {
            params,
            body: Rc::new(body),
        })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let Token::Punct(p) = self.peek().clone() else { break };
            let Some(prec) = precedence(p) else { break };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.binary(prec + 1)?;
            left = combine(p, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = if self.eat("!") {
            UnaryOp::Not
        } else if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("+") {
            UnaryOp::Plus
        } else {
            return self.postfix();
        };
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") || self.eat("?.") {
                let optional = matches!(
                    self.tokens[self.pos - 1].token,
                    Token::Punct("?.")
                );
                if optional && self.at_punct("(") {
                    continue;
                }
                let property = self.ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional,
                };
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat("(") {
                let mut args = Vec::new();
                while !self.eat(")") {
                    args.push(self.expression()?);
                    if !self.at_punct(")") {
                        self.expect(",")?;
                    }
                }
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::string(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat("]") {
                    if self.eat("...") {
                        items.push(ArrayItem::Spread(self.expression()?));
                    } else {
                        items.push(ArrayItem::Item(self.expression()?));
                    }
                    if !self.at_punct("]") {
                        self.expect(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => {
                let mut props = Vec::new();
                while !self.eat("}") {
                    if self.eat("...") {
                        props.push(Property::Spread(self.expression()?));
                    } else {
                        let key = match self.advance() {
                            Token::Ident(k) | Token::Str(k) => k,
                            Token::Number(n) => Value::Number(n).to_display(),
                            _ => return Err(self.error("expected property key")),
                        };
                        if self.eat(":") {
                            props.push(Property::Pair(key, self.expression()?));
                        } else {
                            props.push(Property::Pair(key.clone(), Expr::Ident(key)));
                        }
                    }
                    if !self.at_punct("}") {
                        self.expect(",")?;
                    }
                }
                Ok(Expr::Object(props))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("unexpected token"))
            }
        }
    }
}

fn precedence(p: &str) -> Option<u8> {
    Some(match p {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "==" | "!=" | "===" | "!==" => 4,
        "<" | ">" | "<=" | ">=" => 5,
        "+" | "-" => 6,
        "*" | "/" | "%" => 7,
        _ => return None,
    })
}

fn combine(p: &str, left: Expr, right: Expr) -> Expr {
    let logical = match p {
        "&&" => Some(LogicalOp::And),
        "||" => Some(LogicalOp::Or),
        "??" => Some(LogicalOp::Nullish),
        _ => None,
    };
    if let Some(op) = logical {
        return Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    let op = match p {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "===" => BinaryOp::StrictEq,
        "!==" => BinaryOp::StrictNotEq,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        _ => BinaryOp::Ge,
    };
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_member_chain() {
        let expr = parse("state.user.name").unwrap();
        let Expr::Member { object, property, .. } = expr else {
            panic!("expected member");
        };
        assert_eq!(property, "name");
        assert!(matches!(*object, Expr::Member { .. }));
    }

    #[test]
    fn respects_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Binary { op: BinaryOp::Add, right, .. } = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_arrow_functions() {
        assert!(matches!(parse("(a, b) => a + b").unwrap(), Expr::Arrow { ref params, .. } if params.len() == 2));
        assert!(matches!(parse("e => self.pick(e)").unwrap(), Expr::Arrow { .. }));
        assert!(matches!(parse("(state.a)").unwrap(), Expr::Member { .. }));
    }

    #[test]
    fn parses_object_literals_with_spread() {
        let expr = parse("{ k1: 2, 'k2': 3, ...input.rest, short }").unwrap();
        let Expr::Object(props) = expr else { panic!("expected object") };
        assert_eq!(props.len(), 4);
        assert!(matches!(props[2], Property::Spread(_)));
    }

    #[test]
    fn template_splits_segments() {
        let segments = parse_template("Hello {state.name}, {'{x}'}!").unwrap();
        assert_eq!(segments.len(), 5);
        assert!(matches!(&segments[0], Segment::Text(t) if t == "Hello "));
        assert!(matches!(&segments[3], Segment::Code(Expr::Literal(_))));
    }

    #[test]
    fn reports_trailing_garbage() {
        assert!(parse("a b").is_err());
        assert!(parse_template("{state.").is_err());
    }
}
