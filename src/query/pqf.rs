//! Prefix query format (PQF) compiler.
//!
//! ```text
//! query      ::= [ "@attrset" set ] structure
//! structure  ::= "@attr" [ set ] type "=" value structure
//!              | "@term" ( "general" | "numeric" | "string" ) structure
//!              | ( "@and" | "@or" | "@not" ) structure structure
//!              | "@set" name
//!              | term
//! ```
//!
//! Attributes given before an operator apply to every term below it.
//! Terms may be quoted with `"`; inside quotes `\` escapes the next char.

use bytes::Bytes;

use super::{PrefixCompiler, QueryError};
use crate::protocol::apdu::{
    AttributeElement, AttributesPlusTerm, Operand, Operator, RpnQuery, RpnStructure, Term,
};
use crate::protocol::{AttributeSet, Oid};

/// PQF compiler with a configurable default attribute set.
#[derive(Debug, Clone)]
pub struct Pqf {
    default_attribute_set: Oid,
}

impl Default for Pqf {
    fn default() -> Self {
        Self {
            default_attribute_set: AttributeSet::Bib1.oid(),
        }
    }
}

impl Pqf {
    /// Compiler whose queries default to `attribute_set` when no
    /// `@attrset` is given.
    pub fn with_attribute_set(attribute_set: Oid) -> Self {
        Self {
            default_attribute_set: attribute_set,
        }
    }
}

impl PrefixCompiler for Pqf {
    fn compile(&self, query: &str) -> Result<RpnQuery, QueryError> {
        let mut parser = Parser {
            tokens: tokenize(query)?,
            next: 0,
            end: query.len(),
        };

        let attribute_set = if parser.peek_operator("@attrset") {
            parser.next += 1;
            let name = parser.operand("attribute set after @attrset")?;
            AttributeSet::resolve(&name.text)
                .ok_or_else(|| error(name.pos, format!("unknown attribute set {:?}", name.text)))?
        } else {
            self.default_attribute_set.clone()
        };

        let rpn = parser.structure(Vec::new(), TermKind::General)?;
        if let Some(extra) = parser.tokens.get(parser.next) {
            return Err(error(extra.pos, "extra tokens after query".to_string()));
        }
        Ok(RpnQuery { attribute_set, rpn })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
    pos: usize,
}

#[derive(Debug, Clone, Copy)]
enum TermKind {
    General,
    Numeric,
    CharacterString,
}

fn error(pos: usize, msg: String) -> QueryError {
    QueryError::Prefix { pos, msg }
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut text = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    },
                    _ => text.push(c),
                }
            }
            if !closed {
                return Err(error(pos, "unterminated quoted term".to_string()));
            }
            tokens.push(Token {
                text,
                quoted: true,
                pos,
            });
        } else {
            while let Some(&(_, c)) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
                pos,
            });
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    next: usize,
    end: usize,
}

impl Parser {
    fn peek_operator(&self, op: &str) -> bool {
        self.tokens
            .get(self.next)
            .is_some_and(|t| !t.quoted && t.text == op)
    }

    fn take(&mut self, what: &str) -> Result<Token, QueryError> {
        match self.tokens.get(self.next) {
            Some(t) => {
                self.next += 1;
                Ok(t.clone())
            }
            None => Err(error(self.end, format!("missing {}", what))),
        }
    }

    /// A token that is not an `@` operator.
    fn operand(&mut self, what: &str) -> Result<Token, QueryError> {
        let t = self.take(what)?;
        if !t.quoted && t.text.starts_with('@') {
            return Err(error(t.pos, format!("expected {}, found {}", what, t.text)));
        }
        Ok(t)
    }

    fn structure(
        &mut self,
        mut attributes: Vec<AttributeElement>,
        kind: TermKind,
    ) -> Result<RpnStructure, QueryError> {
        let t = self.take("query")?;
        if t.quoted || !t.text.starts_with('@') {
            return term(t, attributes, kind);
        }
        match t.text.as_str() {
            "@and" | "@or" | "@not" => {
                let op = match t.text.as_str() {
                    "@and" => Operator::And,
                    "@or" => Operator::Or,
                    _ => Operator::AndNot,
                };
                let left = self.structure(attributes.clone(), kind)?;
                let right = self.structure(attributes, kind)?;
                Ok(RpnStructure::RpnRpnOp(Box::new(left), Box::new(right), op))
            }
            "@attr" => {
                attributes.push(self.attribute()?);
                self.structure(attributes, kind)
            }
            "@term" => {
                let k = self.operand("term type after @term")?;
                let kind = match k.text.as_str() {
                    "general" => TermKind::General,
                    "numeric" => TermKind::Numeric,
                    "string" => TermKind::CharacterString,
                    other => return Err(error(k.pos, format!("unknown term type {:?}", other))),
                };
                self.structure(attributes, kind)
            }
            "@set" => {
                let name = self.operand("result set name after @set")?;
                Ok(RpnStructure::Op(Operand::ResultSet(name.text)))
            }
            "@attrset" => Err(error(t.pos, "@attrset is only allowed first".to_string())),
            other => Err(error(t.pos, format!("unsupported operator {}", other))),
        }
    }

    /// `[set] type=value` following `@attr`.
    fn attribute(&mut self) -> Result<AttributeElement, QueryError> {
        let first = self.operand("attribute after @attr")?;
        let (attribute_set, pair) = if first.text.contains('=') {
            (None, first)
        } else {
            let set = AttributeSet::resolve(&first.text).ok_or_else(|| {
                error(first.pos, format!("unknown attribute set {:?}", first.text))
            })?;
            (Some(set), self.operand("attribute after attribute set")?)
        };

        let Some((ty, value)) = pair.text.split_once('=') else {
            return Err(error(pair.pos, format!("expected type=value, found {}", pair.text)));
        };
        let numeric = |s: &str| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| error(pair.pos, format!("attribute {:?} is not numeric", s)))
        };
        Ok(AttributeElement {
            attribute_set,
            attribute_type: numeric(ty)?,
            value: numeric(value)?,
        })
    }
}

fn term(t: Token, attributes: Vec<AttributeElement>, kind: TermKind) -> Result<RpnStructure, QueryError> {
    let term = match kind {
        TermKind::General => Term::General(Bytes::from(t.text.into_bytes())),
        TermKind::Numeric => Term::Numeric(
            t.text
                .parse()
                .map_err(|_| error(t.pos, format!("numeric term expected, found {:?}", t.text)))?,
        ),
        TermKind::CharacterString => Term::CharacterString(t.text),
    };
    Ok(RpnStructure::Op(Operand::AttrTerm(AttributesPlusTerm {
        attributes,
        term,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(q: &str) -> Result<RpnQuery, QueryError> {
        Pqf::default().compile(q)
    }

    fn attr(ty: i64, value: i64) -> AttributeElement {
        AttributeElement {
            attribute_set: None,
            attribute_type: ty,
            value,
        }
    }

    fn leaf(attributes: Vec<AttributeElement>, term: &str) -> RpnStructure {
        RpnStructure::Op(Operand::AttrTerm(AttributesPlusTerm {
            attributes,
            term: Term::General(Bytes::copy_from_slice(term.as_bytes())),
        }))
    }

    #[test]
    fn test_plain_term() {
        let q = compile("dinosaurs").unwrap();
        assert_eq!(q.attribute_set, AttributeSet::Bib1.oid());
        assert_eq!(q.rpn, leaf(vec![], "dinosaurs"));
    }

    #[test]
    fn test_attributes_accumulate() {
        let q = compile("@attr 1=4 @attr 5=1 dino").unwrap();
        assert_eq!(q.rpn, leaf(vec![attr(1, 4), attr(5, 1)], "dino"));
    }

    #[test]
    fn test_attributes_before_operator_apply_to_both_sides() {
        let q = compile("@attr 1=1003 @or bakker \"horner jack\"").unwrap();
        assert_eq!(
            q.rpn,
            RpnStructure::RpnRpnOp(
                Box::new(leaf(vec![attr(1, 1003)], "bakker")),
                Box::new(leaf(vec![attr(1, 1003)], "horner jack")),
                Operator::Or,
            )
        );
    }

    #[test]
    fn test_nested_operators() {
        let q = compile("@and @not a b @set prior").unwrap();
        let RpnStructure::RpnRpnOp(left, right, Operator::And) = q.rpn else {
            panic!("expected @and at the top");
        };
        assert!(matches!(*left, RpnStructure::RpnRpnOp(_, _, Operator::AndNot)));
        assert_eq!(*right, RpnStructure::Op(Operand::ResultSet("prior".to_string())));
    }

    #[test]
    fn test_attrset_prefix_and_per_attribute_set() {
        let q = compile("@attrset gils @attr bib-1 1=4 x").unwrap();
        assert_eq!(q.attribute_set, AttributeSet::Gils.oid());
        let RpnStructure::Op(Operand::AttrTerm(apt)) = q.rpn else {
            panic!("expected a term");
        };
        assert_eq!(apt.attributes[0].attribute_set, Some(AttributeSet::Bib1.oid()));
    }

    #[test]
    fn test_term_types() {
        let q = compile("@term numeric 1999").unwrap();
        let RpnStructure::Op(Operand::AttrTerm(apt)) = q.rpn else {
            panic!("expected a term");
        };
        assert_eq!(apt.term, Term::Numeric(1999));

        let q = compile("@term string caf\u{e9}").unwrap();
        let RpnStructure::Op(Operand::AttrTerm(apt)) = q.rpn else {
            panic!("expected a term");
        };
        assert_eq!(apt.term, Term::CharacterString("caf\u{e9}".to_string()));
    }

    #[test]
    fn test_quoted_escapes_and_operator_lookalikes() {
        let q = compile(r#""@and" "say \"hi\"""#);
        assert!(matches!(q, Err(QueryError::Prefix { pos: 7, .. })));

        let q = compile(r#""say \"hi\"""#).unwrap();
        assert_eq!(q.rpn, leaf(vec![], "say \"hi\""));
    }

    #[test]
    fn test_error_positions() {
        assert_eq!(
            compile("@and a"),
            Err(QueryError::Prefix {
                pos: 6,
                msg: "missing query".to_string()
            })
        );
        assert!(matches!(compile("@attr 1=x a"), Err(QueryError::Prefix { pos: 6, .. })));
        assert!(matches!(compile("@prox a b"), Err(QueryError::Prefix { pos: 0, .. })));
        assert!(matches!(compile("a \"open"), Err(QueryError::Prefix { pos: 2, .. })));
        assert!(matches!(compile("a b"), Err(QueryError::Prefix { pos: 2, .. })));
        assert!(matches!(compile("@term numeric abc"), Err(QueryError::Prefix { pos: 14, .. })));
    }
}
