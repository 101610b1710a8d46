//! Group-by + aggregate-function application over a query's result set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Either a bare variable name or a literal/reference interpolation,
/// e.g. `"{account}/{region}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AggregateVariableName {
    Simple(String),
    Interpolated(Vec<InterpolationPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InterpolationPart {
    Literal(String),
    Reference(String),
}

impl fmt::Display for AggregateVariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateVariableName::Simple(name) => write!(f, "{name}"),
            AggregateVariableName::Interpolated(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        InterpolationPart::Literal(lit) => write!(f, "{lit}")?,
                        InterpolationPart::Reference(r) => write!(f, "{{{r}}}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateVariable {
    pub name: AggregateVariableName,
    pub as_name: Option<String>,
}

impl fmt::Display for AggregateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(alias) = &self.as_name {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

/// A named value an aggregate function operates on: either a bare string
/// (a variable reference) or an integer literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AggregateFunctionArg {
    Name(String),
    Int(i64),
}

impl fmt::Display for AggregateFunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunctionArg::Name(n) => write!(f, "{n}"),
            AggregateFunctionArg::Int(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

/// A post-computation arithmetic chain applied after the aggregate function,
/// e.g. `sum(bytes) / 1024 / 1024` renders `ops = [(Div, 1024.0), (Div, 1024.0)]`.
pub type ArithChain = Vec<(ArithOp, f64)>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateFunction {
    pub function: String,
    pub name: AggregateFunctionArg,
    pub ops: Vec<(ArithOp, ArithNumber)>,
    pub as_name: Option<String>,
}

/// Wrapper over `f64` with a total order, for use inside a hashable chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArithNumber(pub f64);

impl PartialEq for ArithNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for ArithNumber {}
impl PartialOrd for ArithNumber {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ArithNumber {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl std::hash::Hash for ArithNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function, self.name)?;
        for (op, num) in &self.ops {
            write!(f, " {op} {}", num.0)?;
        }
        if let Some(alias) = &self.as_name {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    pub group_by: Vec<AggregateVariable>,
    pub group_func: Vec<AggregateFunction>,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group_by: Vec<String> = self.group_by.iter().map(|v| v.to_string()).collect();
        let funcs: Vec<String> = self.group_func.iter().map(|v| v.to_string()).collect();
        write!(f, "aggregate({}: {})", group_by.join(", "), funcs.join(", "))
    }
}
