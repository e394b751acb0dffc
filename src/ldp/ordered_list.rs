//! Ordered membership as a doubly linked list of proxy nodes inside a
//! graph. Each proxy points at one member (`proxyFor`), at the container
//! (`proxyIn`) and at its neighbours (`next`/`prev`); the container points
//! at the head and tail with `first`/`last`. The walk from `first` along
//! `next` is the only source of order.
use std::collections::{HashMap, HashSet};

use crate::error::{CofferError, Result};
use crate::ldp::graph::{Graph, Term};
use crate::ldp::schema::{IANA_FIRST, IANA_LAST, IANA_NEXT, IANA_PREV, ORE_PROXY_FOR, ORE_PROXY_IN};

#[derive(Clone, PartialEq, Debug)]
pub struct ProxyNode {
    pub subject: String,
    pub proxy_for: Term,
    pub prev: Option<String>,
    pub next: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct OrderedList {
    head: Option<String>,
    tail: Option<String>,
    nodes: HashMap<String, ProxyNode>,
    minted: usize,
}

impl OrderedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(container: &str, targets: impl IntoIterator<Item = Term>) -> Self {
        let mut list = Self::new();
        for target in targets {
            list.append(container, target);
        }
        list
    }

    pub fn head(&self) -> Option<&ProxyNode> {
        self.head.as_ref().and_then(|s| self.nodes.get(s))
    }
    pub fn tail(&self) -> Option<&ProxyNode> {
        self.tail.as_ref().and_then(|s| self.nodes.get(s))
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn mint(&mut self, container: &str) -> String {
        loop {
            self.minted += 1;
            let subject = format!("{}#proxy{}", container, self.minted);
            if !self.nodes.contains_key(&subject) {
                return subject;
            }
        }
    }

    pub fn append(&mut self, container: &str, target: Term) {
        let subject = self.mint(container);
        let prev = self.tail.take();
        if let Some(node) = prev.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            node.next = Some(subject.clone());
        }
        if self.head.is_none() {
            self.head = Some(subject.clone());
        }
        self.tail = Some(subject.clone());
        self.nodes.insert(
            subject.clone(),
            ProxyNode {
                subject,
                proxy_for: target,
                prev,
                next: None,
            },
        );
    }

    /// Nodes from head to tail.
    pub fn iter(&self) -> Walk<'_> {
        Walk {
            list: self,
            at: self.head.as_deref(),
        }
    }

    pub fn targets(&self) -> Vec<Term> {
        self.iter().map(|node| node.proxy_for.clone()).collect()
    }

    pub fn to_graph(&self, container: &str) -> Graph {
        let mut graph = Graph::new();
        for node in self.iter() {
            graph.add(&node.subject, ORE_PROXY_FOR, node.proxy_for.clone());
            graph.add(&node.subject, ORE_PROXY_IN, Term::iri(container));
            if let Some(next) = &node.next {
                graph.add(&node.subject, IANA_NEXT, Term::iri(next));
            }
            if let Some(prev) = &node.prev {
                graph.add(&node.subject, IANA_PREV, Term::iri(prev));
            }
        }
        if let (Some(head), Some(tail)) = (&self.head, &self.tail) {
            graph.add(container, IANA_FIRST, Term::iri(head));
            graph.add(container, IANA_LAST, Term::iri(tail));
        }
        graph
    }

    /// Rebuilds the list of `container` by walking `next` links from its
    /// `first` pointer. A cycle or a proxy without a target is corruption.
    pub fn from_graph(graph: &Graph, container: &str) -> Result<Self> {
        let mut list = Self::new();
        let mut at = graph
            .object(container, IANA_FIRST)
            .and_then(Term::as_iri)
            .map(str::to_owned);
        let mut visited = HashSet::new();
        let mut prev: Option<String> = None;
        while let Some(subject) = at {
            if !visited.insert(subject.clone()) {
                return Err(CofferError::corrupt(format!("proxy list of {container} loops at {subject}")));
            }
            let proxy_for = graph
                .object(&subject, ORE_PROXY_FOR)
                .cloned()
                .ok_or_else(|| CofferError::corrupt(format!("proxy {subject} has no target")))?;
            let next = graph
                .object(&subject, IANA_NEXT)
                .and_then(Term::as_iri)
                .map(str::to_owned);
            if list.head.is_none() {
                list.head = Some(subject.clone());
            }
            list.tail = Some(subject.clone());
            list.nodes.insert(
                subject.clone(),
                ProxyNode {
                    subject: subject.clone(),
                    proxy_for,
                    prev: prev.replace(subject),
                    next: next.clone(),
                },
            );
            at = next;
        }
        list.minted = list.nodes.len();
        Ok(list)
    }
}

pub struct Walk<'a> {
    list: &'a OrderedList,
    at: Option<&'a str>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a ProxyNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.nodes.get(self.at?)?;
        self.at = node.next.as_deref();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = "http://x/rest/parent";

    fn members(ids: &[&str]) -> Vec<Term> {
        ids.iter().map(|id| Term::iri(format!("http://x/rest/{id}"))).collect()
    }

    #[test]
    fn conversions_are_inverse() {
        for ids in [vec![], vec!["a"], vec!["b", "a", "c"], vec!["a", "a", "b", "a"]] {
            let targets = members(&ids);
            let list = OrderedList::from_targets(CONTAINER, targets.clone());
            assert_eq!(list.targets(), targets);
            let back = OrderedList::from_graph(&list.to_graph(CONTAINER), CONTAINER).unwrap();
            assert_eq!(back.targets(), targets);
            assert_eq!(back.len(), ids.len());
        }
    }

    #[test]
    fn empty_list_writes_no_pointers() {
        let graph = OrderedList::new().to_graph(CONTAINER);
        assert!(graph.is_empty());
    }

    #[test]
    fn head_and_tail_are_linked() {
        let list = OrderedList::from_targets(CONTAINER, members(&["a", "b"]));
        let head = list.head().unwrap();
        let tail = list.tail().unwrap();
        assert_eq!(head.next.as_deref(), Some(tail.subject.as_str()));
        assert_eq!(tail.prev.as_deref(), Some(head.subject.as_str()));
        assert!(head.prev.is_none() && tail.next.is_none());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = Graph::new();
        graph.add(CONTAINER, IANA_FIRST, Term::iri("http://x/p#1"));
        graph.add("http://x/p#1", ORE_PROXY_FOR, Term::iri("http://x/a"));
        graph.add("http://x/p#1", IANA_NEXT, Term::iri("http://x/p#1"));
        assert!(OrderedList::from_graph(&graph, CONTAINER).is_err());
    }
}
