//! RSQL/FIQL filter parser.
//!
//! Grammar:
//!
//! ```text
//! expr   := term ((';' | ',') term)*
//! term   := '(' expr ')' | clause
//! clause := field op value
//! field  := ident ('.' ident)*
//! value  := quoted | bare | '(' item (',' item)* ')'   -- lists only for =in= / =out=
//! ```
//!
//! The parser walks an explicit byte cursor. Quoted literals are opaque, so
//! separators inside quotes never split terms. Parenthesis nesting is capped
//! at [`MAX_FILTER_NESTING`] before descending, which bounds recursion
//! regardless of input size.

use crate::error::{CompileError, Result};
use crate::query::ast::{
    Connective, FilterClause, FilterComplexity, FilterNode, NodeKind, Operator,
};

/// Hard cap on grouping parenthesis depth.
pub const MAX_FILTER_NESTING: usize = 256;

/// Output of [`parse_filter`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFilter {
    /// Syntax tree, absent for an empty filter.
    pub root: Option<FilterNode>,
    /// Flattened leaf clauses in source order.
    pub clauses: Vec<FilterClause>,
    /// Structural metrics.
    pub complexity: FilterComplexity,
}

/// Parses a filter expression. Empty or whitespace-only input yields no clauses.
pub fn parse_filter(text: &str) -> Result<ParsedFilter> {
    if text.trim().is_empty() {
        return Ok(ParsedFilter::default());
    }
    let mut cursor = Cursor::new(text);
    let root = cursor.parse_expr(0)?;
    cursor.skip_ws();
    match cursor.peek() {
        None => {}
        Some(')') => return Err(syntax("unbalanced parentheses")),
        Some(_) => return Err(syntax("unexpected trailing input")),
    }
    Ok(ParsedFilter {
        clauses: root.clauses(),
        complexity: root.complexity(),
        root: Some(root),
    })
}

fn syntax(reason: &'static str) -> CompileError {
    CompileError::FilterSyntax { reason }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn parse_expr(&mut self, nesting: usize) -> Result<FilterNode> {
        let mut terms = vec![self.parse_term(nesting)?];
        let mut connectives = Vec::new();
        loop {
            self.skip_ws();
            let connective = match self.peek() {
                Some(';') => Connective::And,
                Some(',') => Connective::Or,
                _ => break,
            };
            self.bump();
            connectives.push(connective);
            terms.push(self.parse_term(nesting)?);
        }
        if connectives.is_empty() {
            return Ok(terms.remove(0));
        }
        Ok(FilterNode {
            parens: 0,
            kind: NodeKind::Group { terms, connectives },
        })
    }

    fn parse_term(&mut self, nesting: usize) -> Result<FilterNode> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                if nesting >= MAX_FILTER_NESTING {
                    return Err(CompileError::ComplexityExceeded {
                        parameter: "filter".into(),
                        limit: "max_filter_nesting",
                        max: MAX_FILTER_NESTING as u64,
                        actual: nesting as u64 + 1,
                    });
                }
                self.bump();
                let mut node = self.parse_expr(nesting + 1)?;
                self.skip_ws();
                if !self.eat(')') {
                    return Err(syntax("unbalanced parentheses"));
                }
                node.parens += 1;
                Ok(node)
            }
            Some(_) => Ok(FilterNode {
                parens: 0,
                kind: NodeKind::Clause(self.parse_clause()?),
            }),
            None => Err(syntax("expected a filter clause")),
        }
    }

    fn parse_clause(&mut self) -> Result<FilterClause> {
        let field = self.parse_field()?;
        self.skip_ws();
        let operator = self
            .parse_operator()
            .ok_or_else(|| syntax("missing comparison operator"))?;
        self.skip_ws();
        let raw_values = if operator.is_membership() {
            self.parse_list()?
        } else {
            vec![self.parse_scalar()?]
        };
        Ok(FilterClause {
            field,
            operator,
            raw_values,
        })
    }

    fn parse_field(&mut self) -> Result<String> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                    self.bump();
                }
                _ => return Err(syntax("invalid filter field")),
            }
            while self
                .peek()
                .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            {
                self.bump();
            }
            if !self.eat('.') {
                break;
            }
        }
        Ok(self.src[start..self.pos].to_owned())
    }

    fn parse_operator(&mut self) -> Option<Operator> {
        let rest = self.rest();
        let operator = Operator::ALL
            .into_iter()
            .find(|op| rest.starts_with(op.as_str()))?;
        self.pos += operator.as_str().len();
        Some(operator)
    }

    fn parse_scalar(&mut self) -> Result<String> {
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let value = self.parse_quoted(quote)?;
                self.skip_ws();
                if !matches!(self.peek(), None | Some(';' | ',' | ')')) {
                    return Err(syntax("unexpected input after quoted value"));
                }
                value
            }
            _ => {
                let value = self.take_bare();
                if self.peek() == Some('(') {
                    return Err(syntax("unexpected parenthesis in value"));
                }
                if value.is_empty() {
                    return Err(syntax("filter clause requires a value"));
                }
                value
            }
        };
        Ok(value)
    }

    fn parse_list(&mut self) -> Result<Vec<String>> {
        if !self.eat('(') {
            return Err(syntax("membership operators require list syntax"));
        }
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            let item = match self.peek() {
                Some(quote @ ('"' | '\'')) => self.parse_quoted(quote)?,
                _ => self.take_bare(),
            };
            if !item.is_empty() {
                items.push(item);
            }
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                None => return Err(syntax("unbalanced parentheses")),
                Some(_) => return Err(syntax("invalid membership list")),
            }
        }
        Ok(items)
    }

    /// Returns the literal including its quotes.
    fn parse_quoted(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        self.bump();
        let body = self.rest();
        let end = body
            .find(quote)
            .ok_or_else(|| syntax("unterminated quoted value"))?;
        self.pos += end + quote.len_utf8();
        Ok(self.src[start..self.pos].to_owned())
    }

    fn take_bare(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| !matches!(ch, ';' | ',' | '(' | ')'))
        {
            self.bump();
        }
        self.src[start..self.pos].trim().to_owned()
    }
}
