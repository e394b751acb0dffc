//! Resource -> graph. Every attribute goes through one value-mapping chain
//! that turns a [`Property`] into the triples asserting it.
use std::sync::Arc;

use uuid::Uuid;

use crate::datatype::{Value, format_datetime};
use crate::error::Result;
use crate::ldp::graph::{Graph, Term};
use crate::ldp::ordered_list::OrderedList;
use crate::ldp::schema::{
    Vocabulary, XSD_BOOLEAN, XSD_DATETIME, XSD_DOUBLE, XSD_INTEGER, XSD_STRING,
};
use crate::mapping::{Slot, ValueMapper};
use crate::resource::{CREATED_AT, ID, INTERNAL_RESOURCE, MEMBER_IDS, Resource, UPDATED_AT};

/// One attribute (or one of its values) of the resource at `subject`.
#[derive(Clone, Debug)]
pub struct Property {
    pub subject: String,
    pub key: String,
    pub slot: Slot,
    pub vocabulary: Arc<Vocabulary>,
}

impl Property {
    fn one(&self, value: Value) -> Self {
        Self {
            slot: Slot::One(value),
            ..self.clone()
        }
    }
    fn is_many(&self) -> bool {
        self.slot.is_many()
    }
    /// Nested resources are written under a fragment of their container.
    fn in_fragment(&self) -> bool {
        self.subject.contains('#')
    }
    fn holds(&self, test: impl Fn(&Value) -> bool) -> bool {
        self.slot.value().is_some_and(test)
    }
    fn text(&self) -> String {
        self.slot.value().map(Value::to_string).unwrap_or_default()
    }
    fn assert(&self, object: Term) -> Graph {
        let mut graph = Graph::new();
        graph.add(&self.subject, &self.vocabulary.predicate(&self.key), object);
        graph
    }
    fn literal(&self, datatype: &str) -> Graph {
        self.assert(Term::typed(self.text(), datatype))
    }
}

pub struct GraphWriter {
    vocabulary: Arc<Vocabulary>,
    chain: ValueMapper<Property, Graph>,
}

impl GraphWriter {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            chain: chain(),
            vocabulary,
        }
    }

    /// The complete graph of a resource. Stored graphs are replaced, never
    /// patched, so this is everything the store will hold for it.
    pub fn write(&self, resource: &Resource, subject: &str) -> Result<Graph> {
        write_resource(&self.chain, &self.vocabulary, resource, subject)
    }
}

fn write_resource(
    chain: &ValueMapper<Property, Graph>,
    vocabulary: &Arc<Vocabulary>,
    resource: &Resource,
    subject: &str,
) -> Result<Graph> {
    let mut graph = Graph::new();
    graph.add(
        subject,
        &vocabulary.predicate(INTERNAL_RESOURCE),
        Term::typed(resource.tag(), XSD_STRING),
    );
    for (key, time) in [(CREATED_AT, resource.created_at()), (UPDATED_AT, resource.updated_at())] {
        if let Some(time) = time {
            graph.add(
                subject,
                &vocabulary.predicate(key),
                Term::typed(format_datetime(time), XSD_DATETIME),
            );
        }
    }
    let property = |key: &str, slot: Slot| Property {
        subject: subject.to_owned(),
        key: key.to_owned(),
        slot,
        vocabulary: vocabulary.clone(),
    };
    if subject.contains('#') {
        if let Some(id) = resource.id() {
            graph.merge(chain.resolve(property(ID, Slot::One(Value::Id(id.clone()))))?);
        }
    }
    for (key, values) in resource.fields() {
        graph.merge(chain.resolve(property(key, Slot::Many(values.to_vec())))?);
    }
    Ok(graph)
}

fn chain() -> ValueMapper<Property, Graph> {
    ValueMapper::<Property, Graph>::new("ldp-write")
        .rule(
            |p| p.key == MEMBER_IDS && matches!(&p.slot, Slot::Many(values) if !values.is_empty()),
            |p, m| {
                let Slot::Many(values) = &p.slot else { unreachable!() };
                let mut targets = Vec::with_capacity(values.len());
                for value in values {
                    let member = Property {
                        key: "member_id".to_owned(),
                        ..p.one(value.clone())
                    };
                    if let Some(triple) = m.resolve(member)?.into_iter().next() {
                        targets.push(triple.object);
                    }
                }
                Ok(OrderedList::from_targets(&p.subject, targets).to_graph(&p.subject))
            },
        )
        .rule(Property::is_many, |p, m| {
            let mut graph = Graph::new();
            if let Slot::Many(values) = &p.slot {
                for value in values {
                    graph.merge(m.resolve(p.one(value.clone()))?);
                }
            }
            Ok(graph)
        })
        .rule(
            |p| p.holds(|v| matches!(v, Value::Resource(_))),
            |p, m| {
                let Slot::One(Value::Resource(nested)) = &p.slot else { unreachable!() };
                let container = p.subject.split('#').next().unwrap_or(&p.subject);
                let fragment = format!("{}#{}", container, Uuid::new_v4().simple());
                let mut graph = write_resource(m, &p.vocabulary, &**nested, &fragment)?;
                graph.merge(p.assert(Term::iri(fragment)));
                Ok(graph)
            },
        )
        .rule(
            |p| p.in_fragment() && p.holds(|v| matches!(v, Value::Id(_))),
            |p, _| Ok(p.literal(&p.vocabulary.schema.id_datatype())),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Id(id) if id.scheme().is_none())),
            |p, _| match &p.slot {
                Slot::One(Value::Id(id)) => Ok(p.assert(Term::iri(p.vocabulary.id_to_uri(id)))),
                _ => unreachable!(),
            },
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Id(_))),
            |p, _| Ok(p.literal(&p.vocabulary.schema.id_datatype())),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Uri(_))),
            |p, _| Ok(p.assert(Term::iri(p.text()))),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Literal { .. })),
            |p, _| match &p.slot {
                Slot::One(Value::Literal { value, language }) => {
                    Ok(p.assert(Term::tagged(value.clone(), language.clone())))
                }
                _ => unreachable!(),
            },
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::String(_))),
            |p, _| Ok(p.literal(XSD_STRING)),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Integer(_))),
            |p, _| Ok(p.literal(XSD_INTEGER)),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Float(_))),
            |p, _| match &p.slot {
                // debug formatting keeps the decimal point of whole numbers
                Slot::One(Value::Float(x)) => Ok(p.assert(Term::typed(format!("{x:?}"), XSD_DOUBLE))),
                _ => unreachable!(),
            },
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::Boolean(_))),
            |p, _| Ok(p.literal(XSD_BOOLEAN)),
        )
        .rule(
            |p| p.holds(|v| matches!(v, Value::DateTime(_))),
            |p, _| Ok(p.literal(XSD_DATETIME)),
        )
        .rule(|_| true, |p, _| Ok(p.literal(XSD_STRING)))
}
