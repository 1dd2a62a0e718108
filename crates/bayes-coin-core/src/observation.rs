//! Coin-toss observations and the validation applied before inference runs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every inference run consumes exactly this many tosses.
pub const SEQUENCE_LEN: usize = 100;

/// Prepopulated demonstration data: 100 tosses drawn from a coin with bias 0.7.
pub const DEFAULT_SAMPLE: &str = "0,1,0,0,0,1,1,0,0,1,1,1,1,1,0,1,1,1,0,1,1,1,1,1,1,1,0,0,1,0,\
1,1,1,1,1,1,0,0,1,1,0,0,0,0,1,0,1,1,1,1,0,1,1,1,1,1,1,1,1,0,\
1,1,1,1,0,1,1,1,1,1,1,1,1,1,1,0,1,0,1,1,1,1,1,0,1,1,1,1,1,1,\
1,1,0,1,0,1,0,0,1,1,";

/// Outcome of a single toss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toss {
    Tail,
    Head,
}

impl Toss {
    /// Maps the binary encoding (`0` = tail, `1` = head).
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Toss::Tail),
            1 => Some(Toss::Head),
            _ => None,
        }
    }

    pub const fn value(self) -> u8 {
        match self {
            Toss::Tail => 0,
            Toss::Head => 1,
        }
    }

    pub const fn is_head(self) -> bool {
        matches!(self, Toss::Head)
    }
}

impl fmt::Display for Toss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toss::Tail => write!(f, "tail"),
            Toss::Head => write!(f, "head"),
        }
    }
}

/// Validated sequence of exactly [`SEQUENCE_LEN`] tosses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationSequence {
    tosses: Vec<Toss>,
}

impl ObservationSequence {
    /// Parses comma-separated integers. Newlines are ignored and empty fields are
    /// skipped, so a trailing comma is accepted.
    pub fn parse(text: &str) -> Result<Self, ObservationError> {
        let cleaned: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        let mut values = Vec::with_capacity(SEQUENCE_LEN);
        for (position, token) in cleaned
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .enumerate()
        {
            let value = token
                .parse::<i64>()
                .map_err(|_| ObservationError::Parse {
                    position,
                    token: token.to_string(),
                })?;
            values.push(value);
        }
        Self::from_values(&values)
    }

    /// Validates already-parsed integers: the length is checked before the values.
    pub fn from_values(values: &[i64]) -> Result<Self, ObservationError> {
        if values.len() != SEQUENCE_LEN {
            return Err(ObservationError::InvalidLength {
                found: values.len(),
                expected: SEQUENCE_LEN,
            });
        }
        let tosses = values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Toss::from_value(*value).ok_or(ObservationError::InvalidValue {
                    index,
                    value: *value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tosses })
    }

    pub fn from_tosses(tosses: Vec<Toss>) -> Result<Self, ObservationError> {
        if tosses.len() != SEQUENCE_LEN {
            return Err(ObservationError::InvalidLength {
                found: tosses.len(),
                expected: SEQUENCE_LEN,
            });
        }
        Ok(Self { tosses })
    }

    /// Draws [`SEQUENCE_LEN`] independent tosses from a coin with the given bias.
    pub fn simulate<R: Rng + ?Sized>(bias: f64, rng: &mut R) -> Result<Self, ObservationError> {
        if !(0.0..=1.0).contains(&bias) {
            return Err(ObservationError::InvalidBias { bias });
        }
        let tosses = (0..SEQUENCE_LEN)
            .map(|_| {
                if rng.gen_bool(bias) {
                    Toss::Head
                } else {
                    Toss::Tail
                }
            })
            .collect();
        Self::from_tosses(tosses)
    }

    /// The prepopulated demonstration sequence.
    pub fn default_sample() -> Self {
        Self::parse(DEFAULT_SAMPLE).expect("bundled sample is valid")
    }

    pub fn tosses(&self) -> &[Toss] {
        &self.tosses
    }

    pub fn len(&self) -> usize {
        self.tosses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tosses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Toss> + '_ {
        self.tosses.iter().copied()
    }

    pub fn heads(&self) -> usize {
        self.tosses.iter().filter(|toss| toss.is_head()).count()
    }

    pub fn tails(&self) -> usize {
        self.tosses.len() - self.heads()
    }

    /// Renders the sequence back into the comma-separated input format.
    pub fn to_csv(&self) -> String {
        self.tosses
            .iter()
            .map(|toss| toss.value().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for ObservationSequence {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationError {
    InvalidLength { found: usize, expected: usize },
    InvalidValue { index: usize, value: i64 },
    Parse { position: usize, token: String },
    InvalidBias { bias: f64 },
}

impl fmt::Display for ObservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationError::InvalidLength { found, expected } => {
                write!(f, "got {found} values, exactly {expected} are required")
            }
            ObservationError::InvalidValue { index, value } => {
                write!(
                    f,
                    "value {value} at position {index} is not allowed, only 0 and 1 are"
                )
            }
            ObservationError::Parse { position, token } => {
                write!(f, "'{token}' at position {position} is not an integer")
            }
            ObservationError::InvalidBias { bias } => {
                write!(f, "bias {bias} is outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for ObservationError {}
