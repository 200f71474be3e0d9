//! Condition Evaluation
//!
//! A single threshold comparison with an optional sustain requirement.
//! The evaluator holds no state: the running duration is kept by the rule
//! engine and passed in, which keeps this independently testable.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison operator of an alert condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Neq => "neq",
        }
    }

    /// Instantaneous comparison of `value` against `threshold`
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Gte => value >= threshold,
            Operator::Lte => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Neq => value != threshold,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator text that is not one of `gt, lt, gte, lte, eq, neq`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "gte" => Ok(Operator::Gte),
            "lte" => Ok(Operator::Lte),
            "eq" => Ok(Operator::Eq),
            "neq" => Ok(Operator::Neq),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// Evaluate one condition.
///
/// With `required_secs == 0` this is the bare operator check. Otherwise the
/// comparison must hold now *and* have held for at least `required_secs`.
pub fn evaluate(
    value: f64,
    operator: Operator,
    threshold: f64,
    required_secs: u64,
    accumulated_secs: u64,
) -> bool {
    let holds = operator.apply(value, threshold);

    if required_secs > 0 {
        holds && accumulated_secs >= required_secs
    } else {
        holds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators() {
        assert!(Operator::Gt.apply(39.1, 39.0));
        assert!(!Operator::Gt.apply(39.0, 39.0));
        assert!(Operator::Gte.apply(39.0, 39.0));
        assert!(Operator::Lt.apply(89.0, 90.0));
        assert!(Operator::Lte.apply(90.0, 90.0));
        assert!(Operator::Eq.apply(3.0, 3.0));
        assert!(Operator::Neq.apply(2.0, 3.0));
    }

    #[test]
    fn test_parse_operator() {
        assert_eq!("gte".parse::<Operator>(), Ok(Operator::Gte));
        assert_eq!(
            "between".parse::<Operator>(),
            Err(UnknownOperator("between".to_string()))
        );
        for op in [Operator::Gt, Operator::Lt, Operator::Gte, Operator::Lte, Operator::Eq, Operator::Neq] {
            assert_eq!(op.as_str().parse::<Operator>(), Ok(op));
        }
    }

    #[test]
    fn test_sustain_requirement() {
        // Holds but not long enough
        assert!(!evaluate(120.0, Operator::Gt, 100.0, 300, 240));
        assert!(evaluate(120.0, Operator::Gt, 100.0, 300, 300));
        // Long enough but no longer holds
        assert!(!evaluate(90.0, Operator::Gt, 100.0, 300, 600));
    }
}

/// Property-based tests using proptest
#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_operator() -> impl Strategy<Value = Operator> {
        prop_oneof![
            Just(Operator::Gt),
            Just(Operator::Lt),
            Just(Operator::Gte),
            Just(Operator::Lte),
            Just(Operator::Eq),
            Just(Operator::Neq),
        ]
    }

    proptest! {
        /// Without a sustain requirement the accumulated duration is irrelevant
        #[test]
        fn zero_duration_is_instantaneous(
            value in -200.0..200.0f64,
            threshold in -200.0..200.0f64,
            accumulated in 0u64..100_000,
            op in any_operator()
        ) {
            prop_assert_eq!(
                evaluate(value, op, threshold, 0, accumulated),
                op.apply(value, threshold)
            );
        }
    }
}
