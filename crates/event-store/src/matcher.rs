use serde_json::Value;

use crate::error::{EventStoreError, Result};

/// Comparison operators supported by metadata constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    LowerThan,
    LowerThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
}

impl ComparisonOperator {
    /// The SQL spelling used when a constraint is compiled.
    pub fn as_sql(self) -> &'static str {
        match self {
            ComparisonOperator::Equals => "=",
            ComparisonOperator::NotEquals => "!=",
            ComparisonOperator::LowerThan => "<",
            ComparisonOperator::LowerThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::Like => "LIKE",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single predicate over one metadata key.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    field: String,
    operator: ComparisonOperator,
    value: Value,
}

impl Constraint {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A conjunction of predicates over metadata keys.
///
/// The store compiles each constraint into a `metadata ->> 'field' <op> $n`
/// fragment; constraints are visited in insertion order so the parameter
/// positions stay stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMatcher {
    constraints: Vec<Constraint>,
}

impl MetadataMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a constraint. Values must be JSON scalars; arrays, objects and
    /// null are rejected because `->>` comparisons are scalar-valued.
    pub fn with(
        mut self,
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let value = value.into();
        if value.is_array() || value.is_object() || value.is_null() {
            return Err(EventStoreError::InvalidArgument(
                "metadata constraints require scalar values",
            ));
        }
        self.constraints.push(Constraint {
            field: field.into(),
            operator,
            value,
        });
        Ok(self)
    }

    /// Visits constraints in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl<'a> IntoIterator for &'a MetadataMatcher {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
