use polytype::Type;
use winnow::{
    ascii::multispace0,
    combinator::{delimited, opt, separated},
    prelude::*,
    token::take_while,
};

use super::{Grammar, Node, NULL_TOKEN};

#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    InapplicableRule(Type, String),
    /// A rule was given the wrong number of arguments: (name, expected, found).
    WrongArity(String, usize, usize),
    Other(String),
}
impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match *self {
            ParseError::InapplicableRule(ref nt, ref s) => {
                write!(f, "invalid rule {} for nonterminal {}", s, nt)
            }
            ParseError::WrongArity(ref s, expected, found) => write!(
                f,
                "rule {} takes {} arguments but was given {}",
                s, expected, found
            ),
            ParseError::Other(ref err) => write!(f, "could not parse: {}", err),
        }
    }
}
impl std::error::Error for ParseError {}

#[derive(Debug)]
struct Item(String, Vec<Item>);
impl Item {
    fn into_node(self, grammar: &Grammar, nt: usize) -> Result<Node, ParseError> {
        if self.0 == NULL_TOKEN && self.1.is_empty() {
            return Ok(Node::null(nt));
        }
        let idx = grammar.find_rule(nt, &self.0).ok_or_else(|| {
            ParseError::InapplicableRule(grammar.nonterminal_type(nt).clone(), self.0.clone())
        })?;
        let child_nts = grammar.rule(nt, idx).children();
        if child_nts.len() != self.1.len() {
            return Err(ParseError::WrongArity(
                self.0,
                child_nts.len(),
                self.1.len(),
            ));
        }
        let children = self
            .1
            .into_iter()
            .zip(child_nts)
            .map(|(item, &child)| item.into_node(grammar, child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::new(nt, idx, children))
    }
}

fn name_char(c: char) -> bool {
    !c.is_whitespace() && !(c == '(' || c == ')' || c == ',')
}

/// `name` or `name(item,...)`, with whitespace allowed around every token.
fn item(input: &mut &str) -> PResult<Item> {
    let name = delimited(multispace0, take_while(1.., name_char), multispace0).parse_next(input)?;
    let args: Option<Vec<Item>> = opt(delimited(
        ("(", multispace0),
        separated(0.., item, ","),
        (")", multispace0),
    ))
    .parse_next(input)?;
    Ok(Item(name.to_owned(), args.unwrap_or_default()))
}

pub fn parse(grammar: &Grammar, input: &str, nt: usize) -> Result<Node, ParseError> {
    item.parse(input)
        .map_err(|err| ParseError::Other(err.to_string()))
        .and_then(|item| item.into_node(grammar, nt))
}
