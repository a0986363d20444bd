//! Store-level query model: field/operator/value triples composed with
//! AND/OR groups, plus sort, relations, and offset/limit.

use chrono::{DateTime, Utc};

use crate::enums::SortOrder;
use crate::query::schema::CollectionSchema;

/// A typed literal bound into a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Timestamp(dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring match; the store wraps the value in wildcards and escapes
    /// any wildcard characters it contains.
    Contains,
    IsNull,
    IsNotNull,
}

/// `field <op> value`. `value` is `None` only for the null checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition(Condition),
    /// Every child must hold. An empty `All` matches everything.
    All(Vec<Self>),
    /// At least one child must hold. An empty `Any` matches nothing.
    Any(Vec<Self>),
}

impl Default for Predicate {
    fn default() -> Self {
        Self::All(Vec::new())
    }
}

impl Predicate {
    fn cond(field: impl Into<String>, op: Operator, value: Option<Scalar>) -> Self {
        Self::Condition(Condition {
            field: field.into(),
            op,
            value,
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::cond(field, Operator::Eq, Some(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::cond(field, Operator::Lt, Some(value.into()))
    }

    pub fn le(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::cond(field, Operator::Le, Some(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::cond(field, Operator::Gt, Some(value.into()))
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::cond(field, Operator::Ge, Some(value.into()))
    }

    pub fn contains(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self::cond(field, Operator::Contains, Some(Scalar::Text(term.into())))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::cond(field, Operator::IsNull, None)
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::cond(field, Operator::IsNotNull, None)
    }

    /// AND `other` onto this predicate without discarding anything already
    /// in it. Flattens into an existing `All` group.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All(mut children) => {
                children.push(other);
                Self::All(children)
            }
            single => Self::All(vec![single, other]),
        }
    }

    /// Fields referenced anywhere in the tree.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Condition(c) => vec![c.field.as_str()],
            Self::All(children) | Self::Any(children) => {
                children.iter().flat_map(Self::fields).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// A fully planned query against one collection, ready for a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub collection: &'static CollectionSchema,
    pub predicate: Predicate,
    pub sort: Option<Sort>,
    pub relations: Vec<String>,
    pub offset: u64,
    /// `None` returns every matching row.
    pub limit: Option<u32>,
    pub include_soft_deleted: bool,
}

impl StoreQuery {
    /// An unpaginated, unsorted query matching every live row.
    #[must_use]
    pub fn all(collection: &'static CollectionSchema) -> Self {
        Self {
            collection,
            predicate: Predicate::default(),
            sort: None,
            relations: Vec::new(),
            offset: 0,
            limit: None,
            include_soft_deleted: false,
        }
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    #[must_use]
    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.extend(relations.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn take(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn wants(&self, relation: &str) -> bool {
        self.relations.iter().any(|r| r == relation)
    }
}
