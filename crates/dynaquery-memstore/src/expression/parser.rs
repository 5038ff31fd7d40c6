//! Tokenizer and recursive-descent parser for condition and projection
//! expressions.
//!
//! Keywords and function names are case-insensitive. Precedence from lowest
//! to highest is `OR`, `AND`, `NOT`, then comparisons and functions.

use std::fmt;

use super::ast::{AttributePath, CompareOp, Expr, FunctionName, LogicalOp, Operand, PathElement};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// The input is not a well-formed expression.
    #[error("Syntax error: expected {expected}, found {found}")]
    Syntax {
        /// What the parser wanted.
        expected: String,
        /// What it got.
        found: String,
    },
    /// A `#name` placeholder has no entry in the attribute names.
    #[error("Unresolved expression attribute name: {name}")]
    UnresolvedName {
        /// The placeholder.
        name: String,
    },
    /// A `:value` placeholder has no entry in the attribute values.
    #[error("Unresolved expression attribute value: {name}")]
    UnresolvedValue {
        /// The placeholder.
        name: String,
    },
    /// A function got the wrong kind or number of arguments.
    #[error("Invalid operand for {function}: {message}")]
    InvalidOperand {
        /// The function.
        function: String,
        /// Explanation.
        message: String,
    },
}

fn syntax(expected: impl Into<String>, found: impl fmt::Display) -> ExpressionError {
    ExpressionError::Syntax {
        expected: expected.into(),
        found: found.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    NamePlaceholder(String),
    ValuePlaceholder(String),
    Index(usize),
    Compare(CompareOp),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Size,
    Function(FunctionName),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::NamePlaceholder(s) => write!(f, "#{s}"),
            Self::ValuePlaceholder(s) => write!(f, ":{s}"),
            Self::Index(n) => write!(f, "{n}"),
            Self::Compare(op) => write!(f, "'{}'", compare_symbol(*op)),
            Self::Dot => f.write_str("'.'"),
            Self::Comma => f.write_str("','"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Between => f.write_str("BETWEEN"),
            Self::In => f.write_str("IN"),
            Self::Size => f.write_str("size"),
            Self::Function(name) => f.write_str(name.as_str()),
            Self::Eof => f.write_str("end of expression"),
        }
    }
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    let take_word = |start: usize| -> (String, usize) {
        let end = chars[start..]
            .iter()
            .position(|c| !is_word_char(*c))
            .map_or(chars.len(), |offset| start + offset);
        (chars[start..end].iter().collect(), end)
    };

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let next = chars.get(pos + 1).copied();
        let (token, consumed) = match (c, next) {
            ('<', Some('=')) => (Token::Compare(CompareOp::Le), 2),
            ('<', Some('>')) => (Token::Compare(CompareOp::Ne), 2),
            ('>', Some('=')) => (Token::Compare(CompareOp::Ge), 2),
            ('<', _) => (Token::Compare(CompareOp::Lt), 1),
            ('>', _) => (Token::Compare(CompareOp::Gt), 1),
            ('=', _) => (Token::Compare(CompareOp::Eq), 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('#' | ':', _) => {
                let (word, end) = take_word(pos + 1);
                if word.is_empty() {
                    return Err(syntax(format!("placeholder name after '{c}'"), "nothing"));
                }
                let token = if c == '#' {
                    Token::NamePlaceholder(word)
                } else {
                    Token::ValuePlaceholder(word)
                };
                tokens.push(token);
                pos = end;
                continue;
            }
            (d, _) if d.is_ascii_digit() => {
                let (word, end) = take_word(pos);
                let index = word
                    .parse()
                    .map_err(|_| syntax("list index", format!("'{word}'")))?;
                tokens.push(Token::Index(index));
                pos = end;
                continue;
            }
            (a, _) if a.is_ascii_alphabetic() || a == '_' => {
                let (word, end) = take_word(pos);
                tokens.push(keyword(word));
                pos = end;
                continue;
            }
            (other, _) => return Err(syntax("a token", format!("'{other}'"))),
        };
        tokens.push(token);
        pos += consumed;
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn keyword(word: String) -> Token {
    match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "between" => Token::Between,
        "in" => Token::In,
        "size" => Token::Size,
        "attribute_exists" => Token::Function(FunctionName::AttributeExists),
        "attribute_not_exists" => Token::Function(FunctionName::AttributeNotExists),
        "attribute_type" => Token::Function(FunctionName::AttributeType),
        "begins_with" => Token::Function(FunctionName::BeginsWith),
        "contains" => Token::Function(FunctionName::Contains),
        _ => Token::Ident(word),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        let token = self.bump();
        if token == *expected {
            Ok(())
        } else {
            Err(syntax(expected.to_string(), token))
        }
    }

    fn finish(&self) -> Result<(), ExpressionError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(syntax("end of expression", other)),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and_expr()?;
        while *self.peek() == Token::Or {
            self.bump();
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not_expr()?;
        while *self.peek() == Token::And {
            self.bump();
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if *self.peek() == Token::Not {
            self.bump();
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek().clone() {
            Token::LParen => {
                self.bump();
                let inner = self.or_expr()?;
                self.eat(&Token::RParen)?;
                Ok(inner)
            }
            Token::Function(name) => {
                self.bump();
                let args = self.operand_list()?;
                if args.len() != name.arity() {
                    return Err(ExpressionError::InvalidOperand {
                        function: name.as_str().to_owned(),
                        message: format!("expected {} arguments, got {}", name.arity(), args.len()),
                    });
                }
                Ok(Expr::Function { name, args })
            }
            _ => {
                let left = self.operand()?;
                self.predicate(left)
            }
        }
    }

    fn predicate(&mut self, left: Operand) -> Result<Expr, ExpressionError> {
        match self.bump() {
            Token::Compare(op) => Ok(Expr::Compare {
                left,
                op,
                right: self.operand()?,
            }),
            Token::Between => {
                let low = self.operand()?;
                self.eat(&Token::And)?;
                let high = self.operand()?;
                Ok(Expr::Between {
                    value: left,
                    low,
                    high,
                })
            }
            Token::In => Ok(Expr::In {
                value: left,
                list: self.operand_list()?,
            }),
            other => Err(syntax("comparison, BETWEEN, or IN", other)),
        }
    }

    fn operand_list(&mut self) -> Result<Vec<Operand>, ExpressionError> {
        self.eat(&Token::LParen)?;
        let mut list = vec![self.operand()?];
        while *self.peek() == Token::Comma {
            self.bump();
            list.push(self.operand()?);
        }
        self.eat(&Token::RParen)?;
        Ok(list)
    }

    fn operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.peek().clone() {
            Token::ValuePlaceholder(name) => {
                self.bump();
                Ok(Operand::Value(format!(":{name}")))
            }
            Token::Size => {
                self.bump();
                self.eat(&Token::LParen)?;
                let path = self.path()?;
                self.eat(&Token::RParen)?;
                Ok(Operand::Size(path))
            }
            _ => Ok(Operand::Path(self.path()?)),
        }
    }

    fn path(&mut self) -> Result<AttributePath, ExpressionError> {
        let mut elements = vec![self.path_segment()?];
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    elements.push(self.path_segment()?);
                }
                Token::LBracket => {
                    self.bump();
                    match self.bump() {
                        Token::Index(idx) => elements.push(PathElement::Index(idx)),
                        other => return Err(syntax("list index", other)),
                    }
                    self.eat(&Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(AttributePath { elements })
    }

    fn path_segment(&mut self) -> Result<PathElement, ExpressionError> {
        match self.bump() {
            Token::Ident(name) => Ok(PathElement::Attribute(name)),
            Token::NamePlaceholder(name) => Ok(PathElement::Attribute(format!("#{name}"))),
            other => Err(syntax("attribute name or #name", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parses a condition, filter, or key-condition expression.
///
/// # Errors
///
/// Returns [`ExpressionError::Syntax`] for malformed input and
/// [`ExpressionError::InvalidOperand`] for wrong function arity.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.or_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses a projection expression into its comma-separated paths.
///
/// # Errors
///
/// Returns [`ExpressionError::Syntax`] for malformed input.
pub fn parse_projection(input: &str) -> Result<Vec<AttributePath>, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let mut paths = vec![parser.path()?];
    while *parser.peek() == Token::Comma {
        parser.bump();
        paths.push(parser.path()?);
    }
    parser.finish()?;
    Ok(paths)
}
