//! Declarative shape descriptors for vault documents.
//!
//! A schema is a closed set of tags the marshaller pattern-matches on:
//! scalar primitives, nested record nodes, and homogeneous sequences.
//! Declarations are fixed at definition time; nothing is inferred from the
//! data on disk.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Shape of one declared value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Bool,
    /// Any JSON integer. Floats do not conform.
    Int,
    /// A JSON float literal. Integer literals do not conform, which keeps
    /// the raw/typed round trip byte-exact.
    Float,
    Str,
    /// JSON `null` or the inner shape; `Option<T>` on the typed side.
    Optional(Box<Shape>),
    /// A nested record with declared, ordered fields.
    Node(NodeShape),
    /// Homogeneous ordered sequence of the element shape.
    Seq(Box<Shape>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeShape {
    pub name: &'static str,
    pub fields: Vec<FieldShape>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    pub name: &'static str,
    pub shape: Shape,
}

impl Shape {
    pub fn node(name: &'static str, fields: Vec<FieldShape>) -> Self {
        Shape::Node(NodeShape { name, fields })
    }

    pub fn seq(elem: Shape) -> Self {
        Shape::Seq(Box::new(elem))
    }

    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    /// Human label used in mismatch reports.
    pub fn describe(&self) -> String {
        match self {
            Shape::Bool => "bool".to_string(),
            Shape::Int => "int".to_string(),
            Shape::Float => "float".to_string(),
            Shape::Str => "string".to_string(),
            Shape::Optional(inner) => format!("{} or null", inner.describe()),
            Shape::Node(node) => format!("object `{}`", node.name),
            Shape::Seq(elem) => format!("sequence of {}", elem.describe()),
        }
    }
}

impl FieldShape {
    pub fn new(name: &'static str, shape: Shape) -> Self {
        Self { name, shape }
    }
}

/// A typed vault document.
///
/// Implementors are plain records whose declared fields mirror their
/// [`Shape`]. The marshalling engine is the only producer of typed values;
/// no dynamically-keyed map is ever handed out as a document.
pub trait Document: Serialize + DeserializeOwned + Clone + PartialEq + Send {
    fn shape() -> Shape;
}

/// Top-level documents may also be an ordered sequence of a record type.
impl<D: Document> Document for Vec<D> {
    fn shape() -> Shape {
        Shape::Seq(Box::new(D::shape()))
    }
}
