//! Recursive-descent parser for the query-string language: bare/field-scoped
//! terms, quoted phrases, `@field:[min max]` numeric ranges, `@field:{a|b}`
//! tag sets, `*` wildcard, `-` for NOT, `~` for OPTIONAL, `|` for OR,
//! parenthesised grouping, and otherwise implicit AND by juxtaposition.
//! Synonym/stem/phonetic expansion (each becoming a union child) is the
//! tokenizer's job and stays out of this crate's scope; this parser only
//! builds the tree over whatever tokens the query string already names.

use crate::error::{CoreError, Result};
use crate::query::ast::QueryNode;

pub struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    pub fn parse(input: &str) -> Result<QueryNode> {
        let mut p = Parser { chars: input.chars().collect(), pos: 0 };
        p.skip_ws();
        if p.at_end() {
            return Ok(QueryNode::Wildcard);
        }
        let node = p.parse_or()?;
        p.skip_ws();
        if !p.at_end() {
            return Err(CoreError::Syntax(format!("unexpected trailing input at position {}", p.pos)));
        }
        Ok(node)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CoreError::Syntax(format!("expected '{c}' at position {}", self.pos)))
        }
    }

    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut terms = vec![self.parse_and()?];
        loop {
            self.skip_ws();
            if self.peek() == Some('|') {
                self.advance();
                self.skip_ws();
                terms.push(self.parse_and()?);
            } else {
                break;
            }
        }
        Ok(if terms.len() == 1 { terms.pop().unwrap() } else { QueryNode::Or(terms) })
    }

    fn parse_and(&mut self) -> Result<QueryNode> {
        let mut terms = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('|') | Some(')') => break,
                _ => terms.push(self.parse_unary()?),
            }
        }
        if terms.is_empty() {
            return Err(CoreError::Syntax("expected a query clause".to_string()));
        }
        Ok(if terms.len() == 1 { terms.pop().unwrap() } else { QueryNode::And(terms) })
    }

    fn parse_unary(&mut self) -> Result<QueryNode> {
        match self.peek() {
            Some('-') => {
                self.advance();
                Ok(QueryNode::Not(Box::new(self.parse_unary()?)))
            }
            Some('~') => {
                self.advance();
                Ok(QueryNode::Optional(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<QueryNode> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.advance();
                let inner = self.parse_or()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(inner)
            }
            Some('*') => {
                self.advance();
                Ok(QueryNode::Wildcard)
            }
            Some('@') => self.parse_field_clause(),
            Some('"') => {
                let (tokens, _) = self.parse_phrase()?;
                Ok(QueryNode::Phrase { field: None, tokens, slop: 0, in_order: true })
            }
            Some(_) => {
                let word = self.parse_word()?;
                Ok(QueryNode::Term { field: None, token: word })
            }
            None => Err(CoreError::Syntax("unexpected end of query".to_string())),
        }
    }

    fn parse_field_clause(&mut self) -> Result<QueryNode> {
        self.expect('@')?;
        let field = self.parse_ident()?;
        self.expect(':')?;
        self.skip_ws();
        match self.peek() {
            Some('[') => {
                let (min, max) = self.parse_numeric_range()?;
                Ok(QueryNode::NumericRange { field, min, max })
            }
            Some('{') => {
                let values = self.parse_tag_set()?;
                Ok(QueryNode::Tag { field, values })
            }
            Some('"') => {
                let (tokens, _) = self.parse_phrase()?;
                Ok(QueryNode::Phrase { field: Some(field), tokens, slop: 0, in_order: true })
            }
            _ => {
                let word = self.parse_word()?;
                Ok(QueryNode::Term { field: Some(field), token: word })
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(CoreError::Syntax(format!("expected a field name at position {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_word(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if !c.is_whitespace() && !"()|".contains(c)) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(CoreError::Syntax(format!("expected a term at position {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_phrase(&mut self) -> Result<(Vec<String>, String)> {
        self.expect('"')?;
        let start = self.pos;
        while self.peek() != Some('"') {
            if self.advance().is_none() {
                return Err(CoreError::Syntax("unterminated phrase".to_string()));
            }
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.expect('"')?;
        let tokens = raw.split_whitespace().map(|s| s.to_string()).collect();
        Ok((tokens, raw))
    }

    fn parse_numeric_range(&mut self) -> Result<(f64, f64)> {
        self.expect('[')?;
        self.skip_ws();
        let min = self.parse_number()?;
        self.skip_ws();
        let max = self.parse_number()?;
        self.skip_ws();
        self.expect(']')?;
        Ok((min, max))
    }

    fn parse_number(&mut self) -> Result<f64> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '-' || c == '+') {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        if raw == "-inf" {
            return Ok(f64::NEG_INFINITY);
        }
        if raw == "+inf" || raw == "inf" {
            return Ok(f64::INFINITY);
        }
        raw.parse::<f64>().map_err(|_| CoreError::BadVal(format!("not a number: {raw}")))
    }

    fn parse_tag_set(&mut self) -> Result<Vec<String>> {
        self.expect('{')?;
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c != '|' && c != '}') {
                self.pos += 1;
            }
            let raw: String = self.chars[start..self.pos].iter().collect();
            values.push(raw.trim().to_string());
            match self.peek() {
                Some('|') => {
                    self.advance();
                }
                Some('}') => {
                    self.advance();
                    break;
                }
                _ => return Err(CoreError::Syntax("unterminated tag set".to_string())),
            }
        }
        Ok(values)
    }
}
