//! The object interface read by mapping, filtering and result resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::object::value::FieldValue;

/// Shared handle to an application object.
pub type ObjectRef = Arc<dyn Searchable>;

/// What an attribute read returns.
#[derive(Clone)]
pub enum Attribute {
    /// A scalar or list of scalars.
    Value(FieldValue),
    /// A single related object (foreign key); `None` when unset.
    One(Option<ObjectRef>),
    /// A related collection.
    Many(Vec<ObjectRef>),
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Attribute::One(obj) => f
                .debug_tuple("One")
                .field(&obj.as_ref().map(|o| (o.type_id().to_string(), o.pk())))
                .finish(),
            Attribute::Many(objs) => f
                .debug_tuple("Many")
                .field(&objs.iter().map(|o| o.pk()).collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl Attribute {
    /// Scalar view: relations collapse to the primary key(s) of the related objects.
    pub fn to_value(&self) -> FieldValue {
        match self {
            Attribute::Value(v) => v.clone(),
            Attribute::One(Some(obj)) => pk_value(&obj.pk()),
            Attribute::One(None) => FieldValue::Null,
            Attribute::Many(objs) => FieldValue::List(objs.iter().map(|o| pk_value(&o.pk())).collect()),
        }
    }
}

/// Primary keys that look numeric are exposed as integers.
pub fn pk_value(pk: &str) -> FieldValue {
    pk.parse::<i64>()
        .map(FieldValue::Integer)
        .unwrap_or_else(|_| FieldValue::Text(pk.to_string()))
}

/// An object that can be indexed.
///
/// `type_id` is the identifier of the object's concrete type
/// (`"<app_label>.<ModelName>"`). `attribute` returns `None` when the object
/// has no such attribute at all; an attribute that exists but is unset
/// returns `Some(Attribute::Value(FieldValue::Null))`.
pub trait Searchable: Send + Sync + fmt::Debug {
    fn type_id(&self) -> &str;

    fn pk(&self) -> String;

    fn attribute(&self, name: &str) -> Option<Attribute>;
}

/// A generic attribute bag implementing [`Searchable`].
#[derive(Debug, Clone)]
pub struct Record {
    type_id: String,
    pk: String,
    attributes: BTreeMap<String, Attribute>,
}

impl Record {
    pub fn new<T: Into<String>, P: ToString>(type_id: T, pk: P) -> Self {
        Record {
            type_id: type_id.into(),
            pk: pk.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_value<N: Into<String>, V: Into<FieldValue>>(mut self, name: N, value: V) -> Self {
        self.attributes
            .insert(name.into(), Attribute::Value(value.into()));
        self
    }

    pub fn with_one<N: Into<String>>(mut self, name: N, related: Option<ObjectRef>) -> Self {
        self.attributes.insert(name.into(), Attribute::One(related));
        self
    }

    pub fn with_many<N: Into<String>>(mut self, name: N, related: Vec<ObjectRef>) -> Self {
        self.attributes.insert(name.into(), Attribute::Many(related));
        self
    }

    pub fn set<N: Into<String>>(&mut self, name: N, attribute: Attribute) {
        self.attributes.insert(name.into(), attribute);
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }
}

impl Searchable for Record {
    fn type_id(&self) -> &str {
        &self.type_id
    }

    fn pk(&self) -> String {
        self.pk.clone()
    }

    fn attribute(&self, name: &str) -> Option<Attribute> {
        self.attributes.get(name).cloned()
    }
}
