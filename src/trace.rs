//! Immutable execution traces.

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};

use crate::address::{Address, ChoiceMap};

/// One recorded execution of a generative function.
///
/// A trace holds the arguments the model ran with, every random choice it
/// made, its return value and the log joint density of those choices. It is
/// never mutated; updates produce a new trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace<A, V, R> {
    args: A,
    choices: ChoiceMap<V>,
    retval: R,
    #[serde(serialize_with = "finite_score")]
    score: f64,
}

fn finite_score<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if score.is_finite() {
        serializer.serialize_f64(*score)
    } else {
        Err(S::Error::custom(format!("trace score {score} is not finite")))
    }
}

impl<A, V, R> Trace<A, V, R> {
    pub fn new(args: A, choices: ChoiceMap<V>, retval: R, score: f64) -> Self {
        Self {
            args,
            choices,
            retval,
            score,
        }
    }

    pub fn args(&self) -> &A {
        &self.args
    }

    pub fn choices(&self) -> &ChoiceMap<V> {
        &self.choices
    }

    pub fn retval(&self) -> &R {
        &self.retval
    }

    /// Log joint density of the realized choices.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// The value of the choice at `address`.
    pub fn get(&self, address: &Address) -> Option<&V> {
        self.choices.get(address)
    }
}
