//! Query Types - predicates, ordering and join types shared by plans and
//! association operations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Query operator types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
            QueryOperator::Between => write!(f, "BETWEEN"),
        }
    }
}

/// Where clause condition. A list of conditions is a conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<Value>,
    /// For IN, NOT IN, BETWEEN
    pub values: Vec<Value>,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: QueryOperator, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value),
            values: Vec::new(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, QueryOperator::Equal, value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, QueryOperator::NotEqual, value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, QueryOperator::GreaterThan, value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, QueryOperator::LessThan, value.into())
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::In,
            value: None,
            values,
        }
    }

    pub fn not_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::NotIn,
            value: None,
            values,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::IsNull,
            value: None,
            values: Vec::new(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::IsNotNull,
            value: None,
            values: Vec::new(),
        }
    }

    /// Equality, or IN for more than one value
    pub fn eq_or_in(column: impl Into<String>, mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            let value = values.remove(0);
            Self::eq(column, value)
        } else {
            Self::in_list(column, values)
        }
    }

    /// Evaluate the condition against an in-memory row
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        match self.operator {
            QueryOperator::IsNull => actual.is_null(),
            QueryOperator::IsNotNull => !actual.is_null(),
            QueryOperator::In => self.values.iter().any(|v| values_equal(actual, v)),
            QueryOperator::NotIn => !self.values.iter().any(|v| values_equal(actual, v)),
            QueryOperator::Between => match (self.values.first(), self.values.get(1)) {
                (Some(low), Some(high)) => {
                    !actual.is_null()
                        && compare_values(actual, low) != Ordering::Less
                        && compare_values(actual, high) != Ordering::Greater
                }
                _ => false,
            },
            _ => {
                let expected = self.value.as_ref().unwrap_or(&Value::Null);
                if actual.is_null() || expected.is_null() {
                    // SQL three-valued logic: comparisons with NULL never match
                    return false;
                }
                let ordering = compare_values(actual, expected);
                match self.operator {
                    QueryOperator::Equal => values_equal(actual, expected),
                    QueryOperator::NotEqual => !values_equal(actual, expected),
                    QueryOperator::GreaterThan => ordering == Ordering::Greater,
                    QueryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                    QueryOperator::LessThan => ordering == Ordering::Less,
                    QueryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                    _ => false,
                }
            }
        }
    }
}

/// True when every condition matches
pub fn matches_all(conditions: &[WhereCondition], row: &Map<String, Value>) -> bool {
    conditions.iter().all(|condition| condition.matches(row))
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Order by clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Stable in-memory sort following ORDER BY semantics (NULLs first on ASC)
pub fn sort_rows(rows: &mut [Map<String, Value>], order: &[OrderBy]) {
    sort_by_order(rows, order, &row_itself);
}

/// `sort_rows` over any item that exposes a row
pub fn sort_by_order<T>(items: &mut [T], order: &[OrderBy], row_of: &impl Fn(&T) -> &Map<String, Value>) {
    if order.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        let (a, b) = (row_of(a), row_of(b));
        for clause in order {
            let left = a.get(&clause.column).unwrap_or(&Value::Null);
            let right = b.get(&clause.column).unwrap_or(&Value::Null);
            let ordering = match clause.direction {
                OrderDirection::Asc => compare_values(left, right),
                OrderDirection::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn row_itself(row: &Map<String, Value>) -> &Map<String, Value> {
    row
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT OUTER JOIN"),
        }
    }
}

/// Equality across JSON representations (`1` equals `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Total order over JSON values: null < bool < number < string < other
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
