//! Storage-neutral predicate and query model handed to a `ResourceStore`.

use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `ASC` or `DESC`, case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    pub fn strict(self) -> Comparison {
        match self {
            Direction::Asc => Comparison::Gt,
            Direction::Desc => Comparison::Lt,
        }
    }

    pub fn inclusive(self) -> Comparison {
        match self {
            Direction::Asc => Comparison::Ge,
            Direction::Desc => Comparison::Le,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean expression over document paths. Comparisons follow SQL
/// three-valued logic: a comparison against a missing or null value is unknown.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals { path: String, value: Value },
    Like { path: String, pattern: String, case_sensitive: bool },
    Compare { path: String, op: Comparison, value: Value },
    IsNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(path: impl Into<String>, value: Value) -> Self {
        Predicate::Equals {
            path: path.into(),
            value,
        }
    }

    pub fn like(path: impl Into<String>, pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Predicate::Like {
            path: path.into(),
            pattern: pattern.into(),
            case_sensitive,
        }
    }

    pub fn compare(path: impl Into<String>, op: Comparison, value: Value) -> Self {
        Predicate::Compare {
            path: path.into(),
            op,
            value,
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// AND of the given predicates; `None` when there are none.
    pub fn all(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::And(predicates)),
        }
    }

    pub fn any(mut predicates: Vec<Predicate>) -> Predicate {
        if predicates.len() == 1 {
            if let Some(p) = predicates.pop() {
                return p;
            }
        }
        Predicate::Or(predicates)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ordering {
    pub path: String,
    pub direction: Direction,
}

impl Ordering {
    pub fn new(path: impl Into<String>, direction: Direction) -> Self {
        Ordering {
            path: path.into(),
            direction,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub predicate: Option<Predicate>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    /// AND `extra` into the current predicate.
    pub fn and_where(mut self, extra: Option<Predicate>) -> Self {
        self.predicate = match (self.predicate.take(), extra) {
            (Some(a), Some(b)) => Some(Predicate::And(vec![a, b])),
            (a, b) => a.or(b),
        };
        self
    }
}
