//! Parser for the condition-string grammar and projection lists.
//!
//! ```text
//! condition := term op term
//!            | column IN '(' term_list ')'
//!            | column BETWEEN term AND term
//!            | column LIKE pattern
//! op        := '<' | '<=' | '=' | '==' | '>=' | '>'
//! term      := word | quoted | func '(' word ')'
//! ```
//!
//! Words are bare runs of characters; whether a word names a column or is a
//! literal is decided later, against a schema.

use crate::ast::*;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
}

impl ParserError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParserError {}

impl From<ParserError> for EngineError {
    fn from(err: ParserError) -> Self {
        EngineError::Condition(err.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    Quoted(String),
    Operator(String),
    Symbol(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_token(&mut self) -> Result<Token, ParserError> {
        self.skip_ws();
        let Some(ch) = self.peek_char() else {
            return Ok(Token { kind: TokenKind::Eof });
        };

        match ch {
            '\'' | '"' => return self.lex_quoted(ch),
            '(' | ')' | ',' => {
                self.pos += 1;
                return Ok(Token {
                    kind: TokenKind::Symbol(ch),
                });
            }
            '<' | '>' | '=' => {
                let rest = &self.input[self.pos..];
                let op = if rest.starts_with("<=") || rest.starts_with(">=") || rest.starts_with("==")
                {
                    &rest[..2]
                } else {
                    &rest[..1]
                };
                self.pos += op.len();
                return Ok(Token {
                    kind: TokenKind::Operator(op.to_string()),
                });
            }
            '!' => {
                return Err(ParserError::new(format!(
                    "unsupported operator near '{}'",
                    &self.input[self.pos..]
                )))
            }
            _ => {}
        }

        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || is_delimiter(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Ok(Token {
            kind: TokenKind::Word(self.input[start..self.pos].to_string()),
        })
    }

    fn lex_quoted(&mut self, quote: char) -> Result<Token, ParserError> {
        self.pos += quote.len_utf8();
        let mut value = String::new();
        while let Some(c) = self.peek_char() {
            if c == quote {
                if self.input[self.pos + c.len_utf8()..].starts_with(quote) {
                    value.push(quote);
                    self.pos += 2 * c.len_utf8();
                } else {
                    self.pos += c.len_utf8();
                    return Ok(Token {
                        kind: TokenKind::Quoted(value),
                    });
                }
            } else {
                value.push(c);
                self.pos += c.len_utf8();
            }
        }
        Err(ParserError::new("unterminated string literal"))
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '\'' | '"' | '(' | ')' | ',' | '<' | '>' | '=' | '!')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParserError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_next(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParserError> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::new(format!("expected keyword {}", keyword)))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        match self.current() {
            TokenKind::Symbol(c) if *c == symbol => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), ParserError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(ParserError::new(format!("expected symbol {}", symbol)))
        }
    }

    fn expect_eof(&self) -> Result<(), ParserError> {
        match self.current() {
            TokenKind::Eof => Ok(()),
            other => Err(ParserError::new(format!(
                "unexpected trailing input: {}",
                describe(other)
            ))),
        }
    }

    fn parse_condition(&mut self) -> Result<Condition, ParserError> {
        let left = self.parse_term()?;

        if let TokenKind::Operator(symbol) = self.current() {
            let op = ComparisonOp::from_symbol(symbol)
                .ok_or_else(|| ParserError::new(format!("unsupported operator {}", symbol)))?;
            self.advance();
            let right = self.parse_term()?;
            return Ok(Condition::Compare { left, op, right });
        }

        let column = match &left {
            Term::Word(word) => word.clone(),
            Term::Quoted(text) => {
                return Err(ParserError::new(format!(
                    "expected a column name, found string '{}'",
                    text
                )))
            }
        };

        if self.at_keyword("IN") {
            self.advance();
            self.expect_symbol('(')?;
            let mut values = Vec::new();
            if !self.eat_symbol(')') {
                loop {
                    values.push(self.parse_term()?);
                    if self.eat_symbol(',') {
                        continue;
                    }
                    self.expect_symbol(')')?;
                    break;
                }
            }
            return Ok(Condition::In { column, values });
        }

        if self.at_keyword("BETWEEN") {
            self.advance();
            let low = self.parse_term()?;
            self.expect_keyword("AND")?;
            let high = self.parse_term()?;
            return Ok(Condition::Between { column, low, high });
        }

        if self.at_keyword("LIKE") {
            self.advance();
            let pattern = self.parse_pattern()?;
            return Ok(Condition::Like { column, pattern });
        }

        match self.current() {
            TokenKind::Eof => Err(ParserError::new(format!(
                "incomplete condition after '{}'",
                column
            ))),
            other => Err(ParserError::new(format!(
                "expected operator, IN, BETWEEN or LIKE, found {}",
                describe(other)
            ))),
        }
    }

    // An unquoted pattern may span several words; they are rejoined with single spaces.
    fn parse_pattern(&mut self) -> Result<String, ParserError> {
        if let TokenKind::Quoted(text) = self.current() {
            let text = text.clone();
            self.advance();
            return Ok(text);
        }
        let mut parts = Vec::new();
        while let TokenKind::Word(word) = self.current() {
            parts.push(word.clone());
            self.advance();
        }
        if parts.is_empty() {
            return Err(ParserError::new("LIKE requires a pattern"));
        }
        Ok(parts.join(" "))
    }

    fn parse_term(&mut self) -> Result<Term, ParserError> {
        match self.current().clone() {
            TokenKind::Word(word) => {
                self.advance();
                if matches!(self.current(), TokenKind::Symbol('(')) {
                    if let Some(func) = AggregateFunc::from_name(&word) {
                        let arg = self.parse_aggregate_arg()?;
                        return Ok(Term::Word(aggregate_name(func, &arg)));
                    }
                }
                Ok(Term::Word(word))
            }
            TokenKind::Quoted(text) => {
                self.advance();
                Ok(Term::Quoted(text))
            }
            other => Err(ParserError::new(format!(
                "expected a column or value, found {}",
                describe(&other)
            ))),
        }
    }

    fn parse_aggregate_arg(&mut self) -> Result<AggregateArg, ParserError> {
        self.expect_symbol('(')?;
        let arg = match self.current().clone() {
            TokenKind::Word(word) if word == "*" => AggregateArg::Star,
            TokenKind::Word(word) => AggregateArg::Column(word),
            other => {
                return Err(ParserError::new(format!(
                    "expected a column inside aggregate, found {}",
                    describe(&other)
                )))
            }
        };
        self.advance();
        self.expect_symbol(')')?;
        Ok(arg)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParserError> {
        let word = match self.current().clone() {
            TokenKind::Word(word) => word,
            other => {
                return Err(ParserError::new(format!(
                    "expected a column, found {}",
                    describe(&other)
                )))
            }
        };
        if word == "*" {
            self.advance();
            return Ok(SelectItem::Wildcard);
        }
        if matches!(self.peek_next(), TokenKind::Symbol('(')) {
            let func = AggregateFunc::from_name(&word)
                .ok_or_else(|| ParserError::new(format!("unknown aggregate function {}", word)))?;
            self.advance();
            let arg = self.parse_aggregate_arg()?;
            return Ok(SelectItem::Aggregate { func, arg });
        }
        self.advance();
        Ok(SelectItem::Column(word))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Word(word) => format!("'{}'", word),
        TokenKind::Quoted(text) => format!("string '{}'", text),
        TokenKind::Operator(op) => format!("operator {}", op),
        TokenKind::Symbol(c) => format!("symbol {}", c),
        TokenKind::Eof => "end of input".to_string(),
    }
}

/// Parses a single condition string.
pub fn parse_condition(input: &str) -> Result<Condition, ParserError> {
    let mut parser = Parser::new(tokenize(input)?);
    if matches!(parser.current(), TokenKind::Eof) {
        return Err(ParserError::new("empty condition"));
    }
    let condition = parser.parse_condition()?;
    parser.expect_eof()?;
    Ok(condition)
}

/// Parses a comma separated projection list such as `name, sum(salary)`.
pub fn parse_projection(input: &str) -> Result<Vec<SelectItem>, ParserError> {
    let mut parser = Parser::new(tokenize(input)?);
    let mut items = Vec::new();
    loop {
        items.push(parser.parse_select_item()?);
        if parser.eat_symbol(',') {
            continue;
        }
        parser.expect_eof()?;
        break;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Term {
        Term::Word(text.to_string())
    }

    #[test]
    fn parse_comparison_both_orientations() {
        assert_eq!(
            parse_condition("age>30").unwrap(),
            Condition::Compare {
                left: word("age"),
                op: ComparisonOp::Gt,
                right: word("30"),
            }
        );
        assert_eq!(
            parse_condition("30 <= age").unwrap(),
            Condition::Compare {
                left: word("30"),
                op: ComparisonOp::LtEq,
                right: word("age"),
            }
        );
        assert_eq!(
            parse_condition("name == 'O''Brien'").unwrap(),
            Condition::Compare {
                left: word("name"),
                op: ComparisonOp::Eq,
                right: Term::Quoted("O'Brien".to_string()),
            }
        );
    }

    #[test]
    fn parse_in_list_with_mixed_spacing() {
        let condition = parse_condition("id in (5,3, 10 ,4)").unwrap();
        match condition {
            Condition::In { column, values } => {
                assert_eq!(column, "id");
                let texts: Vec<&str> = values.iter().map(|v| v.text()).collect();
                assert_eq!(texts, vec!["5", "3", "10", "4"]);
            }
            other => panic!("expected IN, got {:?}", other),
        }
    }

    #[test]
    fn parse_between_and_like() {
        assert_eq!(
            parse_condition("salary BETWEEN 100 and 200").unwrap(),
            Condition::Between {
                column: "salary".to_string(),
                low: word("100"),
                high: word("200"),
            }
        );
        assert_eq!(
            parse_condition("name LIKE 'A%'").unwrap(),
            Condition::Like {
                column: "name".to_string(),
                pattern: "A%".to_string(),
            }
        );
        assert_eq!(
            parse_condition("name like J_hn%").unwrap(),
            Condition::Like {
                column: "name".to_string(),
                pattern: "J_hn%".to_string(),
            }
        );
    }

    #[test]
    fn parse_aggregate_terms_for_having() {
        assert_eq!(
            parse_condition("sum (salary) > 1000").unwrap(),
            Condition::Compare {
                left: word("sum(salary)"),
                op: ComparisonOp::Gt,
                right: word("1000"),
            }
        );
        assert_eq!(
            parse_condition("count(*)>=2").unwrap(),
            Condition::Compare {
                left: word("count(*)"),
                op: ComparisonOp::GtEq,
                right: word("2"),
            }
        );
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(parse_condition("").is_err());
        assert!(parse_condition("age").is_err());
        assert!(parse_condition("age > ").is_err());
        assert!(parse_condition("age != 3").is_err());
        assert!(parse_condition("age BETWEEN 1 OR 2").is_err());
        assert!(parse_condition("name = 'open").is_err());
        assert!(parse_condition("age > 3 extra").is_err());
        assert!(parse_condition("id IN 1, 2").is_err());
    }

    #[test]
    fn parse_projection_items() {
        let items = parse_projection("dept, sum(salary), count(*)").unwrap();
        assert_eq!(
            items,
            vec![
                SelectItem::Column("dept".to_string()),
                SelectItem::Aggregate {
                    func: AggregateFunc::Sum,
                    arg: AggregateArg::Column("salary".to_string()),
                },
                SelectItem::Aggregate {
                    func: AggregateFunc::Count,
                    arg: AggregateArg::Star,
                },
            ]
        );
        assert_eq!(parse_projection("*").unwrap(), vec![SelectItem::Wildcard]);
        assert!(parse_projection("median(x)").is_err());
        assert!(parse_projection("a,").is_err());
    }
}
