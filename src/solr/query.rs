//! The queries the index backend issues, as values: built by the query
//! service, rendered to query syntax for the HTTP client, and parsed back
//! by the in-process core.
use std::fmt;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::datatype::Id;
use crate::error::{CofferError, Result};
use crate::solr::mapper::{DOCUMENT_ID, document_id, exact_field};
use crate::resource::INTERNAL_RESOURCE;

#[derive(Parser)]
#[grammar = "solr/query.pest"]
struct QueryParser;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    All,
    Term { field: String, value: String },
    /// Documents whose `to` field holds a `from` value of a document
    /// matching `inner`.
    Join {
        from: String,
        to: String,
        inner: Box<Query>,
    },
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn join(from: impl Into<String>, to: impl Into<String>, inner: Query) -> Self {
        Self::Join {
            from: from.into(),
            to: to.into(),
            inner: Box::new(inner),
        }
    }

    pub fn by_id(id: &Id) -> Self {
        Self::term(DOCUMENT_ID, document_id(id))
    }

    pub fn of_model(model: &str) -> Self {
        Self::term(exact_field(INTERNAL_RESOURCE), model)
    }

    /// Documents referenced from `property` of the document of `id`.
    pub fn references(id: &Id, property: &str) -> Self {
        Self::join(exact_field(property), DOCUMENT_ID, Self::by_id(id))
    }

    /// Documents whose `property` references `id`.
    pub fn inverse_references(id: &Id, property: &str) -> Self {
        Self::term(exact_field(property), document_id(id))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let parsed = QueryParser::parse(Rule::query, text.trim())
            .map_err(|e| CofferError::InvalidValue(format!("unsupported query '{text}': {e}")))?
            .next()
            .and_then(|q| q.into_inner().next())
            .ok_or_else(|| CofferError::InvalidValue(format!("empty query '{text}'")))?;
        query(parsed)
    }
}

fn query(pair: Pair<Rule>) -> Result<Query> {
    match pair.as_rule() {
        Rule::all => Ok(Query::All),
        Rule::term => {
            let mut inner = pair.into_inner();
            let field = inner.next().map(|p| p.as_str().to_owned()).unwrap_or_default();
            let value = inner.next().map(value).unwrap_or_default();
            Ok(Query::Term { field, value })
        }
        Rule::join => {
            let (mut from, mut to, mut nested) = (None, None, None);
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::join_arg => {
                        let mut arg = part.into_inner();
                        let key = arg.next().map(|p| p.as_str());
                        let field = arg.next().map(|p| p.as_str().to_owned());
                        match key {
                            Some("from") => from = field,
                            _ => to = field,
                        }
                    }
                    _ => nested = Some(query(part)?),
                }
            }
            match (from, to, nested) {
                (Some(from), Some(to), Some(inner)) => Ok(Query::join(from, to, inner)),
                _ => Err(CofferError::InvalidValue("join needs from, to and a query".to_owned())),
            }
        }
        other => Err(CofferError::InvalidValue(format!("unexpected {other:?} in query"))),
    }
}

fn value(pair: Pair<Rule>) -> String {
    let Some(inner) = pair.into_inner().next() else {
        return String::new();
    };
    match inner.as_rule() {
        Rule::quoted => inner
            .into_inner()
            .next()
            .map(|t| unescape(t.as_str()))
            .unwrap_or_default(),
        _ => inner.as_str().to_owned(),
    }
}

fn unescape(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => plain.extend(chars.next()),
            c => plain.push(c),
        }
    }
    plain
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::All => write!(f, "*:*"),
            Self::Term { field, value } => {
                write!(f, "{field}:\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Self::Join { from, to, inner } => write!(f, "{{!join from={from} to={to}}}{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_queries_parse_back() {
        let queries = [
            Query::All,
            Query::of_model("Book"),
            Query::references(&Id::new("a \"quoted\" id"), "member_ids"),
            Query::inverse_references(&Id::new("x/y"), "authors"),
        ];
        for q in queries {
            assert_eq!(Query::parse(&q.to_string()).unwrap(), q);
        }
    }

    #[test]
    fn hand_written_syntax() {
        assert_eq!(
            Query::parse("{!join from=member_ids_ssim to=id}id:id-123").unwrap(),
            Query::join("member_ids_ssim", "id", Query::term("id", "id-123"))
        );
        assert_eq!(Query::parse(" *:* ").unwrap(), Query::All);
        assert!(matches!(
            Query::parse("title:a OR title:b"),
            Err(CofferError::InvalidValue(_))
        ));
    }
}
