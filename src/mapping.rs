//! First-match value mapping.
//!
//! A [`ValueMapper`] is an ordered chain of [`Handler`]s. `resolve` hands the
//! input to the first handler whose `handles` accepts it; that handler may
//! call back into the same mapper for nested values. Every backend builds
//! its own chains, one per direction, and ends each chain with a catch-all.
use std::fmt;

use crate::datatype::Value;
use crate::error::{CofferError, Result};

/// Write-direction input of the backend codecs: a whole attribute, or one
/// of its values once the attribute has been split up.
#[derive(Clone, Debug)]
pub enum Slot {
    Many(Vec<Value>),
    One(Value),
}

impl Slot {
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::One(v) => Some(v),
            Self::Many(_) => None,
        }
    }
}

pub trait Handler<I, O>: Send + Sync {
    fn handles(&self, input: &I) -> bool;
    fn transform(&self, input: I, mapper: &ValueMapper<I, O>) -> Result<O>;
}

/// A handler made from a pair of closures.
pub struct Rule<P, T> {
    handles: P,
    transform: T,
}

impl<I, O, P, T> Handler<I, O> for Rule<P, T>
where
    P: Fn(&I) -> bool + Send + Sync,
    T: Fn(I, &ValueMapper<I, O>) -> Result<O> + Send + Sync,
{
    fn handles(&self, input: &I) -> bool {
        (self.handles)(input)
    }
    fn transform(&self, input: I, mapper: &ValueMapper<I, O>) -> Result<O> {
        (self.transform)(input, mapper)
    }
}

pub struct ValueMapper<I, O> {
    name: String,
    handlers: Vec<Box<dyn Handler<I, O>>>,
}

impl<I: fmt::Debug, O> ValueMapper<I, O> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn len(&self) -> usize {
        self.handlers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
    pub fn register(&mut self, handler: impl Handler<I, O> + 'static) {
        self.handlers.push(Box::new(handler));
    }
    pub fn with(mut self, handler: impl Handler<I, O> + 'static) -> Self {
        self.register(handler);
        self
    }
    pub fn rule<P, T>(self, handles: P, transform: T) -> Self
    where
        I: 'static,
        O: 'static,
        P: Fn(&I) -> bool + Send + Sync + 'static,
        T: Fn(I, &ValueMapper<I, O>) -> Result<O> + Send + Sync + 'static,
    {
        self.with(Rule { handles, transform })
    }
    /// Runs the first matching handler. No match means the chain is
    /// misconfigured, since every chain is expected to end in a catch-all.
    pub fn resolve(&self, input: I) -> Result<O> {
        match self.handlers.iter().find(|h| h.handles(&input)) {
            Some(handler) => handler.transform(input, self),
            None => Err(CofferError::Config(format!(
                "no handler in '{}' accepts {:?}",
                self.name, input
            ))),
        }
    }
    pub fn resolve_all(&self, inputs: impl IntoIterator<Item = I>) -> Result<Vec<O>> {
        inputs.into_iter().map(|i| self.resolve(i)).collect()
    }
}

impl<I, O> fmt::Debug for ValueMapper<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ValueMapper({}, {} handlers)", self.name, self.handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Tree {
        Leaf(i64),
        Text(String),
        Branch(Vec<Tree>),
    }

    fn summing() -> ValueMapper<Tree, i64> {
        ValueMapper::new("sum")
            .rule(
                |t| matches!(t, Tree::Branch(_)),
                |t, m| match t {
                    Tree::Branch(items) => Ok(m.resolve_all(items)?.into_iter().sum()),
                    _ => unreachable!(),
                },
            )
            .rule(
                |t| matches!(t, Tree::Leaf(n) if *n < 0),
                |_, _| Ok(0),
            )
            .rule(
                |t| matches!(t, Tree::Leaf(_)),
                |t, _| match t {
                    Tree::Leaf(n) => Ok(n),
                    _ => unreachable!(),
                },
            )
    }

    #[test]
    fn first_registered_match_wins() {
        let mapper = summing();
        assert_eq!(mapper.resolve(Tree::Leaf(-5)).unwrap(), 0);
        assert_eq!(mapper.resolve(Tree::Leaf(5)).unwrap(), 5);
    }

    #[test]
    fn handlers_recurse_through_the_mapper() {
        let mapper = summing();
        let tree = Tree::Branch(vec![
            Tree::Leaf(1),
            Tree::Branch(vec![Tree::Leaf(2), Tree::Leaf(-9)]),
            Tree::Leaf(3),
        ]);
        assert_eq!(mapper.resolve(tree).unwrap(), 6);
    }

    #[test]
    fn unmatched_input_is_a_configuration_error() {
        let mapper = summing();
        let error = mapper.resolve(Tree::Text("x".into())).unwrap_err();
        assert!(matches!(error, CofferError::Config(_)));
        assert_eq!(mapper.len(), 3);
    }
}
