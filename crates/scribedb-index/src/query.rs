//! Query model and parsers.
//!
//! Two surface syntaxes produce the same [`ParsedQuery`] tree:
//!
//! - **Simple**: whitespace-separated `field:term` clauses, implicitly
//!   AND-ed; a leading `-` negates a clause (`status:open -title:draft`).
//! - **Grammar**: anything wrapped in parentheses, with `&&`, `||`, `!`,
//!   nested groups, and `field = "quoted value"` / `field:term`
//!   comparisons. Mixing `&&` and `||` at one nesting level is rejected.
//!
//! The serialised tree is the query's stable signature, so two spellings of
//! the same query share a live view.

use crate::error::{IndexError, Result};
use scribedb_commons::IndexSchema;
use serde::Serialize;

/// One node of a parsed query tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryNode {
    Term { field: String, term: String },
    Not(Box<QueryNode>),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
}

/// A parsed, schema-checked query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub root: QueryNode,
}

impl ParsedQuery {
    /// Stable serialised form used for view canonicalisation.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// True when the query string uses the parenthesised grammar.
pub fn is_grammar_query(query: &str) -> bool {
    let trimmed = query.trim();
    trimmed.starts_with('(') && trimmed.ends_with(')')
}

/// Parses either syntax, validating referenced fields against the schema.
pub fn parse(query: &str, schema: &IndexSchema) -> Result<ParsedQuery> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(IndexError::InvalidQuery("empty query".to_string()));
    }
    let root = if is_grammar_query(trimmed) {
        GrammarParser::new(trimmed, schema).parse()?
    } else {
        parse_simple(trimmed, schema)?
    };
    Ok(ParsedQuery { root })
}

fn check_field(field: &str, schema: &IndexSchema) -> Result<()> {
    if schema.field(field).is_none() {
        return Err(IndexError::InvalidQuery(format!(
            "field '{}' not found in index '{}'",
            field, schema.id
        )));
    }
    Ok(())
}

fn parse_simple(query: &str, schema: &IndexSchema) -> Result<QueryNode> {
    let mut clauses = Vec::new();
    for raw in query.split_whitespace() {
        let (negate, raw) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (field, term) = raw.split_once(':').ok_or_else(|| {
            IndexError::InvalidQuery(format!("expected field:term, got '{}'", raw))
        })?;
        if term.is_empty() {
            return Err(IndexError::InvalidQuery(format!(
                "missing term for field '{}'",
                field
            )));
        }
        check_field(field, schema)?;
        let term_node = QueryNode::Term {
            field: field.to_string(),
            term: term.to_string(),
        };
        clauses.push(if negate {
            QueryNode::Not(Box::new(term_node))
        } else {
            term_node
        });
    }
    match clauses.len() {
        0 => Err(IndexError::InvalidQuery("empty query".to_string())),
        1 => Ok(clauses.remove(0)),
        _ => Ok(QueryNode::And(clauses)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    NotEq,
    Word(String),
}

struct GrammarParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    schema: &'a IndexSchema,
}

impl<'a> GrammarParser<'a> {
    fn new(input: &str, schema: &'a IndexSchema) -> Self {
        Self {
            tokens: lex(input),
            pos: 0,
            schema,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(IndexError::InvalidQuery(format!(
                "expected {:?}, got {:?}",
                expected, other
            ))),
        }
    }

    fn parse(&mut self) -> Result<QueryNode> {
        self.expect(Token::LParen)?;
        let node = self.parse_expr()?;
        self.expect(Token::RParen)?;
        if self.peek().is_some() {
            return Err(IndexError::InvalidQuery(
                "trailing input after closing parenthesis".to_string(),
            ));
        }
        Ok(node)
    }

    fn parse_expr(&mut self) -> Result<QueryNode> {
        let mut operands = vec![self.parse_operand()?];
        let mut operator: Option<Token> = None;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::And => Token::And,
                Token::Or => Token::Or,
                Token::RParen => break,
                other => {
                    return Err(IndexError::InvalidQuery(format!(
                        "expected operator, got {:?}",
                        other
                    )))
                }
            };
            match &operator {
                Some(prev) if *prev != op => {
                    return Err(IndexError::InvalidQuery(
                        "cannot mix && and || at one level; add parentheses".to_string(),
                    ))
                }
                _ => operator = Some(op),
            }
            self.next();
            operands.push(self.parse_operand()?);
        }

        Ok(match operator {
            None => operands.remove(0),
            Some(Token::Or) => QueryNode::Or(operands),
            Some(_) => QueryNode::And(operands),
        })
    }

    fn parse_operand(&mut self) -> Result<QueryNode> {
        match self.peek() {
            Some(Token::LParen) => {
                self.next();
                let node = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(node)
            }
            Some(Token::Not) => {
                self.next();
                Ok(QueryNode::Not(Box::new(self.parse_operand()?)))
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<QueryNode> {
        let field = match self.next() {
            Some(Token::Word(word)) => word,
            other => {
                return Err(IndexError::InvalidQuery(format!(
                    "expected field name, got {:?}",
                    other
                )))
            }
        };
        check_field(&field, self.schema)?;

        let negate = match self.next() {
            Some(Token::Eq) => false,
            Some(Token::NotEq) => true,
            other => {
                return Err(IndexError::InvalidQuery(format!(
                    "expected comparison operator after '{}', got {:?}",
                    field, other
                )))
            }
        };

        let term = match self.next() {
            Some(Token::Word(word)) => word,
            other => {
                return Err(IndexError::InvalidQuery(format!(
                    "expected value for field '{}', got {:?}",
                    field, other
                )))
            }
        };

        let node = QueryNode::Term { field, term };
        Ok(if negate {
            QueryNode::Not(Box::new(node))
        } else {
            node
        })
    }
}

fn lex(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                tokens.push(Token::Or);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut word = String::new();
                for next in chars.by_ref() {
                    if next == quote {
                        break;
                    }
                    word.push(next);
                }
                tokens.push(Token::Word(word));
            }
            _ => {
                let mut word = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || "()&|=:!\"'".contains(next) {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    tokens
}
