//! Common Command Language (CCL) parser and RPN lowering.
//!
//! ```text
//! find      ::= elements { ( "and" | "&" | "or" | "|" | "not" | "-" ) elements }
//! elements  ::= "(" find ")"
//!             | "set" "=" name
//!             | qualifiers relation ( "(" find ")" | terms )
//!             | terms
//! qualifiers ::= word { "," word }
//! relation  ::= "=" | "<" | "<=" | ">" | ">=" | "<>"
//! terms     ::= ( word | "quoted phrase" ) { word | "quoted phrase" }
//! ```
//!
//! Boolean operators are left-associative with equal precedence. Adjacent
//! words form a single term. Qualifiers are mapped to Bib-1 attributes by a
//! [`CclBibset`].

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;

use super::{CclCompiler, QueryError};
use crate::protocol::apdu::{
    AttributeElement, AttributesPlusTerm, Operand, Operator, RpnStructure, Term,
};

/// Bib-1 attribute types.
const USE: i64 = 1;
const RELATION: i64 = 2;

/// CCL relation between qualifier and term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl Relation {
    /// Bib-1 relation attribute value.
    pub fn bib1(self) -> i64 {
        match self {
            Relation::Lt => 1,
            Relation::Le => 2,
            Relation::Eq => 3,
            Relation::Ge => 4,
            Relation::Gt => 5,
            Relation::Ne => 6,
        }
    }
}

/// Boolean operator of a CCL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CclOp {
    And,
    Or,
    Not,
}

/// CCL parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CclNode {
    /// A search term, optionally qualified. An empty qualifier list means
    /// the bibset's default qualifier.
    Term {
        qualifiers: Vec<String>,
        relation: Relation,
        term: String,
    },
    /// Reference to a named result set (`set=name`).
    ResultSet(String),
    Op(CclOp, Box<CclNode>, Box<CclNode>),
}

impl CclNode {
    /// Give unqualified terms below this node the given qualifiers.
    fn qualify(self, qualifiers: &[String], relation: Relation) -> CclNode {
        match self {
            CclNode::Term {
                qualifiers: q,
                relation: r,
                term,
            } if q.is_empty() => CclNode::Term {
                qualifiers: qualifiers.to_vec(),
                relation: if r == Relation::Eq { relation } else { r },
                term,
            },
            CclNode::Op(op, l, r) => CclNode::Op(
                op,
                Box::new(l.qualify(qualifiers, relation)),
                Box::new(r.qualify(qualifiers, relation)),
            ),
            other => other,
        }
    }
}

/// Qualifier table: qualifier name → attributes.
///
/// Lines of the text form are `name type=value ...`, where type is a number
/// or one of the letters `u r p s t c` (use, relation, position, structure,
/// truncation, completeness). `#` starts a comment.
///
/// ```
/// use z3950_client::query::CclBibset;
///
/// let bibset: CclBibset = "ti u=4 s=1\nau 1=1003".parse().unwrap();
/// assert!(bibset.get("TI").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CclBibset {
    qualifiers: HashMap<String, Vec<(i64, i64)>>,
    default_qualifier: Option<String>,
}

impl Default for CclBibset {
    fn default() -> Self {
        let mut bibset = Self::empty();
        for (name, use_attr) in [
            ("ti", 4),
            ("au", 1003),
            ("su", 21),
            ("isbn", 7),
            ("issn", 8),
            ("date", 31),
            ("any", 1016),
        ] {
            bibset.insert(name, vec![(USE, use_attr)]);
        }
        bibset.default_qualifier = Some("any".to_string());
        bibset
    }
}

impl CclBibset {
    /// A table without qualifiers; unqualified terms carry no attributes.
    pub fn empty() -> Self {
        Self {
            qualifiers: HashMap::new(),
            default_qualifier: None,
        }
    }

    /// Add or replace a qualifier (names are case-insensitive).
    pub fn insert(&mut self, name: &str, attributes: Vec<(i64, i64)>) {
        self.qualifiers.insert(name.to_lowercase(), attributes);
    }

    /// Qualifier used for unqualified terms.
    pub fn set_default_qualifier(&mut self, name: Option<&str>) {
        self.default_qualifier = name.map(str::to_lowercase);
    }

    pub fn get(&self, name: &str) -> Option<&[(i64, i64)]> {
        self.qualifiers.get(&name.to_lowercase()).map(Vec::as_slice)
    }
}

impl FromStr for CclBibset {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, QueryError> {
        let mut bibset = Self::empty();
        for line in s.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let mut words = line.split_whitespace();
            let Some(name) = words.next() else {
                continue;
            };
            let attributes = words
                .map(|w| bibset_attribute(name, w))
                .collect::<Result<Vec<_>, _>>()?;
            if name.eq_ignore_ascii_case("term") {
                bibset.set_default_qualifier(Some("term"));
            }
            bibset.insert(name, attributes);
        }
        Ok(bibset)
    }
}

fn bibset_attribute(name: &str, pair: &str) -> Result<(i64, i64), QueryError> {
    let bad = || QueryError::CclLower(format!("bad attribute {:?} for qualifier {}", pair, name));
    let (ty, value) = pair.split_once('=').ok_or_else(bad)?;
    let ty = match ty {
        "u" => 1,
        "r" => 2,
        "p" => 3,
        "s" => 4,
        "t" => 5,
        "c" => 6,
        n => n.parse().map_err(|_| bad())?,
    };
    Ok((ty, value.parse().map_err(|_| bad())?))
}

/// CCL compiler over a qualifier table.
#[derive(Debug, Clone, Default)]
pub struct Ccl {
    bibset: CclBibset,
}

impl Ccl {
    pub fn new(bibset: CclBibset) -> Self {
        Self { bibset }
    }

    fn term_attributes(&self, qualifier: &str, relation: Relation) -> Result<Vec<AttributeElement>, QueryError> {
        let attrs = self
            .bibset
            .get(qualifier)
            .ok_or_else(|| QueryError::CclLower(format!("unknown qualifier {}", qualifier)))?;
        let mut out: Vec<AttributeElement> = attrs
            .iter()
            .map(|&(attribute_type, value)| AttributeElement {
                attribute_set: None,
                attribute_type,
                value,
            })
            .collect();
        if relation != Relation::Eq {
            out.retain(|a| a.attribute_type != RELATION);
            out.push(AttributeElement {
                attribute_set: None,
                attribute_type: RELATION,
                value: relation.bib1(),
            });
        }
        Ok(out)
    }

    fn leaf(attributes: Vec<AttributeElement>, term: &str) -> RpnStructure {
        RpnStructure::Op(Operand::AttrTerm(AttributesPlusTerm {
            attributes,
            term: Term::General(Bytes::copy_from_slice(term.as_bytes())),
        }))
    }
}

impl CclCompiler for Ccl {
    fn parse(&self, query: &str) -> Result<CclNode, QueryError> {
        let tokens = tokenize(query)?;
        let mut parser = Parser {
            tokens,
            next: 0,
            end: query.len(),
        };
        let tree = parser.find()?;
        match parser.peek() {
            None => Ok(tree),
            Some(t) => Err(parse_error(t.pos, "unexpected token")),
        }
    }

    fn lower(&self, tree: &CclNode) -> Result<RpnStructure, QueryError> {
        match tree {
            CclNode::Term {
                qualifiers,
                relation,
                term,
            } => {
                if qualifiers.is_empty() {
                    let attributes = match &self.bibset.default_qualifier {
                        Some(q) => self.term_attributes(q, *relation)?,
                        None => Vec::new(),
                    };
                    return Ok(Self::leaf(attributes, term));
                }
                // q1,q2=term searches any of the qualifiers
                let mut rpn: Option<RpnStructure> = None;
                for q in qualifiers {
                    let leaf = Self::leaf(self.term_attributes(q, *relation)?, term);
                    rpn = Some(match rpn {
                        None => leaf,
                        Some(prev) => RpnStructure::RpnRpnOp(Box::new(prev), Box::new(leaf), Operator::Or),
                    });
                }
                rpn.ok_or_else(|| QueryError::CclLower("empty qualifier list".to_string()))
            }
            CclNode::ResultSet(name) => Ok(RpnStructure::Op(Operand::ResultSet(name.clone()))),
            CclNode::Op(op, left, right) => {
                let op = match op {
                    CclOp::And => Operator::And,
                    CclOp::Or => Operator::Or,
                    CclOp::Not => Operator::AndNot,
                };
                Ok(RpnStructure::RpnRpnOp(
                    Box::new(self.lower(left)?),
                    Box::new(self.lower(right)?),
                    op,
                ))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word(String),
    Phrase(String),
    LParen,
    RParen,
    Comma,
    Rel(Relation),
    Bool(CclOp),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn parse_error(pos: usize, msg: &str) -> QueryError {
    QueryError::CclParse {
        pos,
        msg: msg.to_string(),
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '(' | ')' | ',' | '=' | '<' | '>' | '&' | '|' | '"')
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '&' => TokenKind::Bool(CclOp::And),
            '|' => TokenKind::Bool(CclOp::Or),
            '=' => TokenKind::Rel(Relation::Eq),
            '<' => match chars.peek() {
                Some((_, '=')) => {
                    chars.next();
                    TokenKind::Rel(Relation::Le)
                }
                Some((_, '>')) => {
                    chars.next();
                    TokenKind::Rel(Relation::Ne)
                }
                _ => TokenKind::Rel(Relation::Lt),
            },
            '>' => match chars.peek() {
                Some((_, '=')) => {
                    chars.next();
                    TokenKind::Rel(Relation::Ge)
                }
                _ => TokenKind::Rel(Relation::Gt),
            },
            '"' => {
                let mut phrase = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, c)) => phrase.push(c),
                        None => return Err(parse_error(pos, "unterminated phrase")),
                    }
                }
                TokenKind::Phrase(phrase)
            }
            c => {
                let mut word = c.to_string();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || is_special(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                match word.to_lowercase().as_str() {
                    "and" => TokenKind::Bool(CclOp::And),
                    "or" => TokenKind::Bool(CclOp::Or),
                    "not" | "-" => TokenKind::Bool(CclOp::Not),
                    _ => TokenKind::Word(word),
                }
            }
        };
        tokens.push(Token { kind, pos });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    next: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next)
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.next + offset).map(|t| &t.kind)
    }

    fn pos(&self) -> usize {
        self.peek().map_or(self.end, |t| t.pos)
    }

    fn find(&mut self) -> Result<CclNode, QueryError> {
        let mut left = self.elements()?;
        while let Some(TokenKind::Bool(op)) = self.peek_kind(0) {
            let op = *op;
            self.next += 1;
            let right = self.elements()?;
            left = CclNode::Op(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn group(&mut self) -> Result<CclNode, QueryError> {
        let open = self.pos();
        self.next += 1;
        let inner = self.find()?;
        match self.peek_kind(0) {
            Some(TokenKind::RParen) => {
                self.next += 1;
                Ok(inner)
            }
            _ => Err(parse_error(open, "unbalanced parenthesis")),
        }
    }

    fn elements(&mut self) -> Result<CclNode, QueryError> {
        match self.peek_kind(0) {
            Some(TokenKind::LParen) => return self.group(),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("set") => {
                if let Some(TokenKind::Rel(Relation::Eq)) = self.peek_kind(1) {
                    self.next += 2;
                    return match self.peek_kind(0) {
                        Some(TokenKind::Word(name)) | Some(TokenKind::Phrase(name)) => {
                            let name = name.clone();
                            self.next += 1;
                            Ok(CclNode::ResultSet(name))
                        }
                        _ => Err(parse_error(self.pos(), "result set name expected")),
                    };
                }
            }
            Some(TokenKind::Word(_)) | Some(TokenKind::Phrase(_)) => {}
            None => return Err(parse_error(self.end, "search word expected")),
            Some(_) => return Err(parse_error(self.pos(), "search word expected")),
        }

        if let Some(qualifiers) = self.qualifiers() {
            let relation = match self.peek_kind(0) {
                Some(TokenKind::Rel(r)) => *r,
                _ => return Err(parse_error(self.pos(), "relation expected")),
            };
            self.next += 1;
            if let Some(TokenKind::LParen) = self.peek_kind(0) {
                return Ok(self.group()?.qualify(&qualifiers, relation));
            }
            let term = self.terms()?;
            return Ok(CclNode::Term {
                qualifiers,
                relation,
                term,
            });
        }

        Ok(CclNode::Term {
            qualifiers: Vec::new(),
            relation: Relation::Eq,
            term: self.terms()?,
        })
    }

    /// `word {, word}` followed by a relation, or `None` (nothing consumed).
    fn qualifiers(&mut self) -> Option<Vec<String>> {
        let mut offset = 0;
        let mut names = Vec::new();
        loop {
            match self.peek_kind(offset) {
                Some(TokenKind::Word(w)) => names.push(w.clone()),
                _ => return None,
            }
            match self.peek_kind(offset + 1) {
                Some(TokenKind::Comma) => offset += 2,
                Some(TokenKind::Rel(_)) => {
                    self.next += offset + 1;
                    return Some(names);
                }
                _ => return None,
            }
        }
    }

    fn terms(&mut self) -> Result<String, QueryError> {
        let mut words = Vec::new();
        while let Some(TokenKind::Word(w)) | Some(TokenKind::Phrase(w)) = self.peek_kind(0) {
            words.push(w.clone());
            self.next += 1;
        }
        if words.is_empty() {
            return Err(parse_error(self.pos(), "search word expected"));
        }
        Ok(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(qualifiers: &[&str], relation: Relation, term: &str) -> CclNode {
        CclNode::Term {
            qualifiers: qualifiers.iter().map(|q| q.to_string()).collect(),
            relation,
            term: term.to_string(),
        }
    }

    fn attr(ty: i64, value: i64) -> AttributeElement {
        AttributeElement {
            attribute_set: None,
            attribute_type: ty,
            value,
        }
    }

    #[test]
    fn test_parse_qualified_term() {
        let tree = Ccl::default().parse("ti=dinosaurs in the park").unwrap();
        assert_eq!(tree, term(&["ti"], Relation::Eq, "dinosaurs in the park"));
    }

    #[test]
    fn test_parse_left_associative_operators() {
        let tree = Ccl::default().parse("a and b or c not d").unwrap();
        let CclNode::Op(CclOp::Not, left, right) = tree else {
            panic!("expected not at the top");
        };
        assert_eq!(*right, term(&[], Relation::Eq, "d"));
        assert!(matches!(*left, CclNode::Op(CclOp::Or, _, _)));
    }

    #[test]
    fn test_parse_symbols_and_relations() {
        let tree = Ccl::default().parse("date>=1990 & (au=bakker | au=\"horner, jack\")").unwrap();
        let CclNode::Op(CclOp::And, left, right) = tree else {
            panic!("expected and at the top");
        };
        assert_eq!(*left, term(&["date"], Relation::Ge, "1990"));
        assert_eq!(
            *right,
            CclNode::Op(
                CclOp::Or,
                Box::new(term(&["au"], Relation::Eq, "bakker")),
                Box::new(term(&["au"], Relation::Eq, "horner, jack")),
            )
        );
    }

    #[test]
    fn test_parse_qualifier_list_and_group() {
        let tree = Ccl::default().parse("ti,su=(dinosaurs or reptiles)").unwrap();
        assert_eq!(
            tree,
            CclNode::Op(
                CclOp::Or,
                Box::new(term(&["ti", "su"], Relation::Eq, "dinosaurs")),
                Box::new(term(&["ti", "su"], Relation::Eq, "reptiles")),
            )
        );
    }

    #[test]
    fn test_parse_result_set() {
        let tree = Ccl::default().parse("set=prior - ti=eggs").unwrap();
        let CclNode::Op(CclOp::Not, left, _) = tree else {
            panic!("expected not");
        };
        assert_eq!(*left, CclNode::ResultSet("prior".to_string()));
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let ccl = Ccl::default();
        assert_eq!(
            ccl.parse("ti=(a or b"),
            Err(QueryError::CclParse {
                pos: 3,
                msg: "unbalanced parenthesis".to_string()
            })
        );
        assert!(matches!(ccl.parse("a and"), Err(QueryError::CclParse { pos: 5, .. })));
        assert!(matches!(ccl.parse("ti="), Err(QueryError::CclParse { pos: 3, .. })));
        assert!(matches!(ccl.parse("a )"), Err(QueryError::CclParse { pos: 2, .. })));
        assert!(matches!(ccl.parse("\"open"), Err(QueryError::CclParse { pos: 0, .. })));
    }

    #[test]
    fn test_lower_uses_bibset() {
        let ccl = Ccl::default();
        let rpn = ccl.lower(&ccl.parse("au=bakker").unwrap()).unwrap();
        assert_eq!(rpn, Ccl::leaf(vec![attr(USE, 1003)], "bakker"));

        let rpn = ccl.lower(&ccl.parse("dinosaurs").unwrap()).unwrap();
        assert_eq!(rpn, Ccl::leaf(vec![attr(USE, 1016)], "dinosaurs"));
    }

    #[test]
    fn test_lower_relation_and_qualifier_list() {
        let ccl = Ccl::default();
        let rpn = ccl.lower(&ccl.parse("date<1990").unwrap()).unwrap();
        assert_eq!(rpn, Ccl::leaf(vec![attr(USE, 31), attr(RELATION, 1)], "1990"));

        let rpn = ccl.lower(&ccl.parse("ti,au=x").unwrap()).unwrap();
        assert_eq!(
            rpn,
            RpnStructure::RpnRpnOp(
                Box::new(Ccl::leaf(vec![attr(USE, 4)], "x")),
                Box::new(Ccl::leaf(vec![attr(USE, 1003)], "x")),
                Operator::Or,
            )
        );
    }

    #[test]
    fn test_lower_not_is_and_not() {
        let ccl = Ccl::default();
        let rpn = ccl.lower(&ccl.parse("a not b").unwrap()).unwrap();
        assert!(matches!(rpn, RpnStructure::RpnRpnOp(_, _, Operator::AndNot)));
    }

    #[test]
    fn test_lower_unknown_qualifier() {
        let ccl = Ccl::default();
        let tree = ccl.parse("xyz=1").unwrap();
        assert_eq!(
            ccl.lower(&tree),
            Err(QueryError::CclLower("unknown qualifier xyz".to_string()))
        );
    }

    #[test]
    fn test_bibset_text_form() {
        let bibset: CclBibset = "# comment\nti u=4 s=1\nterm 1=1016\n".parse().unwrap();
        assert_eq!(bibset.get("ti"), Some(&[(1, 4), (4, 1)][..]));
        assert_eq!(bibset.default_qualifier.as_deref(), Some("term"));

        let ccl = Ccl::new(bibset);
        let rpn = ccl.lower(&ccl.parse("x").unwrap()).unwrap();
        assert_eq!(rpn, Ccl::leaf(vec![attr(1, 1016)], "x"));

        assert!("ti q=4".parse::<CclBibset>().is_err());
    }

    #[test]
    fn test_empty_bibset_leaves_terms_bare() {
        let ccl = Ccl::new(CclBibset::empty());
        let rpn = ccl.lower(&ccl.parse("x").unwrap()).unwrap();
        assert_eq!(rpn, Ccl::leaf(vec![], "x"));
    }
}
