//! Graph -> resource. Two chains: one decides what each statement means for
//! the resource being read, the other turns RDF terms back into values.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::datatype::{Id, Value, parse_datetime};
use crate::error::{CofferError, Result};
use crate::ldp::graph::{Graph, Term, Triple};
use crate::ldp::ordered_list::OrderedList;
use crate::ldp::schema::{
    FEDORA, IANA_FIRST, IANA_LAST, LDP, LDP_CONTAINS, Vocabulary, XSD_BOOLEAN, XSD_DATETIME,
    XSD_DOUBLE, XSD_INTEGER,
};
use crate::mapping::ValueMapper;
use crate::resource::{
    CREATED_AT, ID, INTERNAL_RESOURCE, MEMBER_IDS, Resource, TypeRegistry, UPDATED_AT,
};

const RESERVED: [&str; 4] = [INTERNAL_RESOURCE, CREATED_AT, UPDATED_AT, ID];

/// A statement seen while reading the resource at `subject` out of `scope`.
#[derive(Clone, Debug)]
pub struct Statement {
    pub triple: Triple,
    pub subject: String,
    pub scope: Arc<Graph>,
}

/// What a statement contributes to the resource under construction.
#[derive(Debug)]
pub enum Applied {
    Skip,
    Attribute(String, Vec<Value>),
    Reserved(&'static str, Value),
}

struct Context {
    vocabulary: Arc<Vocabulary>,
    types: Arc<TypeRegistry>,
    terms: ValueMapper<Term, Value>,
}

pub struct GraphReader {
    statements: ValueMapper<Statement, Applied>,
    context: Arc<Context>,
}

impl GraphReader {
    pub fn new(vocabulary: Arc<Vocabulary>, types: Arc<TypeRegistry>) -> Self {
        let context = Arc::new(Context {
            terms: terms(vocabulary.clone()),
            vocabulary,
            types,
        });
        Self {
            statements: statements(context.clone()),
            context,
        }
    }

    /// The resource described at `subject`, or None when the graph holds no
    /// typed resource there (an intermediate container, for instance).
    pub fn read(&self, graph: Graph, subject: &str) -> Result<Option<Resource>> {
        assemble(&self.statements, &self.context.types, &Arc::new(graph), subject)
    }

    pub fn term(&self, term: Term) -> Result<Value> {
        self.context.terms.resolve(term)
    }
}

fn assemble(
    chain: &ValueMapper<Statement, Applied>,
    types: &Arc<TypeRegistry>,
    scope: &Arc<Graph>,
    subject: &str,
) -> Result<Option<Resource>> {
    let mut tag = None;
    let mut reserved = Vec::new();
    let mut attributes: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for triple in scope.iter() {
        let statement = Statement {
            triple: triple.clone(),
            subject: subject.to_owned(),
            scope: scope.clone(),
        };
        match chain.resolve(statement)? {
            Applied::Skip => {}
            Applied::Attribute(key, values) => attributes.entry(key).or_default().extend(values),
            Applied::Reserved(INTERNAL_RESOURCE, Value::String(t)) => tag = Some(t),
            Applied::Reserved(name, value) => reserved.push((name, value)),
        }
    }
    let Some(tag) = tag else {
        return Ok(None);
    };
    let mut resource = types.resource(&tag);
    for (name, value) in reserved {
        resource.set(name, value)?;
    }
    for (key, values) in attributes {
        resource.load(&key, values)?;
    }
    Ok(Some(resource))
}

fn container_of(uri: &str) -> &str {
    uri.split('#').next().unwrap_or(uri)
}

fn statements(context: Arc<Context>) -> ValueMapper<Statement, Applied> {
    let (c1, c2, c3, c4, c5) = (
        context.clone(),
        context.clone(),
        context.clone(),
        context.clone(),
        context,
    );
    ValueMapper::<Statement, Applied>::new("ldp-read")
        .rule(
            |s| {
                let t = &s.triple;
                t.predicate == IANA_LAST
                    || t.predicate == LDP_CONTAINS
                    || t.predicate.starts_with(FEDORA)
                    || t.object.as_iri().is_some_and(|o| o.starts_with(LDP) || o.starts_with(FEDORA))
            },
            |_, _| Ok(Applied::Skip),
        )
        .rule(
            |s| s.triple.subject_iri() != Some(s.subject.as_str()),
            |_, _| Ok(Applied::Skip),
        )
        .rule(
            |s| s.triple.predicate == IANA_FIRST,
            move |s, _| {
                let list = OrderedList::from_graph(&s.scope, &s.subject)?;
                let members = c1.terms.resolve_all(list.targets())?;
                Ok(Applied::Attribute(MEMBER_IDS.to_owned(), members))
            },
        )
        .rule(
            |s| {
                s.triple
                    .object
                    .as_iri()
                    .is_some_and(|o| o.starts_with(&format!("{}#", container_of(&s.subject))))
            },
            move |s, m| {
                let Some(key) = c2.vocabulary.schema.property_for(&s.triple.predicate) else {
                    return Ok(Applied::Skip);
                };
                let fragment = s.triple.object.as_iri().unwrap_or_default();
                match assemble(m, &c2.types, &s.scope, fragment)? {
                    Some(nested) => Ok(Applied::Attribute(key, vec![Value::from(nested)])),
                    None => {
                        debug!(fragment, "fragment without a type, ignored");
                        Ok(Applied::Skip)
                    }
                }
            },
        )
        .rule(
            move |s| {
                c3.vocabulary
                    .schema
                    .property_for(&s.triple.predicate)
                    .is_some_and(|p| RESERVED.contains(&p.as_str()))
            },
            move |s, _| {
                let property = c4.vocabulary.schema.property_for(&s.triple.predicate);
                let name = RESERVED
                    .iter()
                    .find(|r| property.as_deref() == Some(**r))
                    .copied()
                    .unwrap_or(INTERNAL_RESOURCE);
                Ok(Applied::Reserved(name, c4.terms.resolve(s.triple.object)?))
            },
        )
        .rule(
            |_| true,
            move |s, _| match c5.vocabulary.schema.property_for(&s.triple.predicate) {
                Some(key) => Ok(Applied::Attribute(key, vec![c5.terms.resolve(s.triple.object)?])),
                None => {
                    debug!(predicate = %s.triple.predicate, "unmapped predicate, ignored");
                    Ok(Applied::Skip)
                }
            },
        )
}

fn lexical(term: &Term) -> &str {
    match term {
        Term::Literal { lexical, .. } => lexical,
        Term::Iri(iri) => iri,
        Term::Blank(label) => label,
    }
}

fn parsed<T: std::str::FromStr>(term: &Term) -> Result<T> {
    lexical(term)
        .parse()
        .map_err(|_| CofferError::corrupt(format!("cannot read {term} as {}", std::any::type_name::<T>())))
}

fn terms(vocabulary: Arc<Vocabulary>) -> ValueMapper<Term, Value> {
    let id_datatype = vocabulary.schema.id_datatype();
    let internal = vocabulary.clone();
    ValueMapper::<Term, Value>::new("ldp-terms")
        .rule(
            move |t| t.datatype() == Some(id_datatype.as_str()),
            |t, _| Ok(Value::Id(Id::new(lexical(&t)))),
        )
        .rule(
            |t| t.datatype() == Some(XSD_INTEGER),
            |t, _| Ok(Value::Integer(parsed(&t)?)),
        )
        .rule(
            |t| t.datatype() == Some(XSD_DOUBLE),
            |t, _| Ok(Value::Float(parsed(&t)?)),
        )
        .rule(
            |t| t.datatype() == Some(XSD_BOOLEAN),
            |t, _| Ok(Value::Boolean(parsed(&t)?)),
        )
        .rule(
            |t| t.datatype() == Some(XSD_DATETIME),
            |t, _| Ok(Value::DateTime(parse_datetime(lexical(&t))?)),
        )
        .rule(
            |t| matches!(t, Term::Literal { language: Some(_), .. }),
            |t, _| match t {
                Term::Literal {
                    lexical,
                    language: Some(language),
                    ..
                } => Ok(Value::Literal {
                    value: lexical,
                    language,
                }),
                _ => unreachable!(),
            },
        )
        .rule(
            |t| matches!(t, Term::Literal { .. }),
            |t, _| Ok(Value::String(lexical(&t).to_owned())),
        )
        .rule(
            move |t| t.as_iri().is_some_and(|iri| internal.is_internal(iri)),
            move |t, _| {
                vocabulary
                    .uri_to_id(lexical(&t))
                    .map(Value::Id)
                    .ok_or_else(|| CofferError::corrupt(format!("{t} is not a container")))
            },
        )
        .rule(
            |t| matches!(t, Term::Iri(_)),
            |t, _| Ok(Value::Uri(lexical(&t).to_owned())),
        )
        .rule(
            |_| true,
            |t, _| Err(CofferError::corrupt(format!("cannot read {t} as a value"))),
        )
}
