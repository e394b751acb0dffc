//! A minimal RDF graph: terms, triples and the N-Triples text format the
//! linked-data store speaks.
use std::collections::BTreeSet;
use std::fmt;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{CofferError, Result};

#[derive(Parser)]
#[grammar = "ldp/ntriples.pest"]
struct NTriplesParser;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }
    pub fn typed(lexical: impl Into<String>, datatype: &str) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.to_owned()),
            language: None,
        }
    }
    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }
    pub fn datatype(&self) -> Option<&str> {
        match self {
            Self::Literal { datatype, .. } => datatype.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::Blank(label) => write!(f, "_:{label}"),
            Self::Literal {
                lexical,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape(lexical))?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
    pub fn subject_iri(&self) -> Option<&str> {
        self.subject.as_iri()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// A set of triples. Iteration order is the sort order of the triples,
/// never the order they were added in.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, triple: Triple) {
        self.triples.insert(triple);
    }
    pub fn add(&mut self, subject: &str, predicate: &str, object: Term) {
        self.insert(Triple::new(Term::iri(subject), predicate, object));
    }
    pub fn merge(&mut self, other: Graph) {
        self.triples.extend(other.triples);
    }
    pub fn len(&self) -> usize {
        self.triples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }
    pub fn about<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Triple> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.subject_iri() == Some(subject))
    }
    pub fn objects<'a>(&'a self, subject: &'a str, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.about(subject)
            .filter(move |t| t.predicate == predicate)
            .map(|t| &t.object)
    }
    pub fn object<'a>(&'a self, subject: &'a str, predicate: &'a str) -> Option<&'a Term> {
        self.objects(subject, predicate).next()
    }
    pub fn subjects<'a>(&'a self, predicate: &'a str, object: &'a Term) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.predicate == predicate && &t.object == object)
            .map(|t| &t.subject)
    }

    pub fn to_ntriples(&self) -> String {
        let mut text = String::new();
        for triple in &self.triples {
            text.push_str(&triple.to_string());
            text.push('\n');
        }
        text
    }

    pub fn from_ntriples(text: &str) -> Result<Self> {
        let mut graph = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            graph.insert(parse_triple(line)?);
        }
        Ok(graph)
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<T: IntoIterator<Item = Triple>>(iter: T) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Graph {
    type Item = Triple;
    type IntoIter = std::collections::btree_set::IntoIter<Triple>;
    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_iter()
    }
}

fn parse_triple(line: &str) -> Result<Triple> {
    let parsed = NTriplesParser::parse(Rule::triple, line)
        .map_err(|e| CofferError::corrupt(format!("bad N-Triples statement: {e}")))?
        .next()
        .ok_or_else(|| CofferError::corrupt("empty N-Triples statement"))?;
    let mut terms = parsed
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(term);
    match (terms.next(), terms.next(), terms.next()) {
        (Some(subject), Some(Ok(Term::Iri(predicate))), Some(object)) => {
            Ok(Triple::new(subject?, predicate, object?))
        }
        _ => Err(CofferError::corrupt(format!("malformed statement: {line}"))),
    }
}

fn inner_text(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_default()
}

fn term(pair: Pair<Rule>) -> Result<Term> {
    match pair.as_rule() {
        Rule::iri => Ok(Term::Iri(inner_text(pair))),
        Rule::blank => Ok(Term::Blank(inner_text(pair))),
        Rule::literal => {
            let mut inner = pair.into_inner();
            let lexical = inner.next().map(|p| unescape(p.as_str())).unwrap_or_default();
            let (mut datatype, mut language) = (None, None);
            if let Some(suffix) = inner.next() {
                match suffix.as_rule() {
                    Rule::language => language = Some(inner_text(suffix)),
                    Rule::datatype => {
                        datatype = suffix.into_inner().next().map(inner_text);
                    }
                    _ => {}
                }
            }
            Ok(Term::Literal {
                lexical,
                datatype,
                language,
            })
        }
        other => Err(CofferError::corrupt(format!("unexpected {other:?} in statement"))),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            plain.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => plain.push('\n'),
            Some('r') => plain.push('\r'),
            Some('t') => plain.push('\t'),
            Some(other) => plain.push(other),
            None => plain.push('\\'),
        }
    }
    plain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_survive_the_text_format() {
        let mut graph = Graph::new();
        graph.add("http://x/a", "http://p/title", Term::tagged("Le \"chat\"\nnoir", "fr"));
        graph.add("http://x/a", "http://p/count", Term::typed("3", "http://www.w3.org/2001/XMLSchema#integer"));
        graph.add("http://x/a", "http://p/link", Term::iri("http://x/b#frag"));
        graph.insert(Triple::new(Term::Blank("b0".into()), "http://p/empty", Term::typed("", "http://t")));
        let text = graph.to_ntriples();
        assert_eq!(Graph::from_ntriples(&text).unwrap(), graph);
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let error = Graph::from_ntriples("<http://x/a> nonsense").unwrap_err();
        assert!(matches!(error, CofferError::DataCorruption { .. }));
    }

    #[test]
    fn lookups_by_subject_and_object() {
        let mut graph = Graph::new();
        graph.add("http://x/p#1", "http://ore/proxyFor", Term::iri("http://x/c"));
        graph.add("http://x/p#2", "http://ore/proxyFor", Term::iri("http://x/c"));
        let target = Term::iri("http://x/c");
        assert_eq!(graph.subjects("http://ore/proxyFor", &target).count(), 2);
        assert_eq!(graph.object("http://x/p#1", "http://ore/proxyFor"), Some(&target));
    }
}
