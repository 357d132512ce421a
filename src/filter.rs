use crate::indicators::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

pub const MA_TOLERANCE_RANGE: RangeInclusive<f64> = 0.01..=0.10;
pub const VOLUME_THRESHOLD_RANGE: RangeInclusive<f64> = 1.0..=5.0;
pub const RSI_THRESHOLD_RANGE: RangeInclusive<f64> = 10.0..=50.0;

#[derive(Debug, Error, PartialEq)]
pub enum FilterConfigError {
    #[error("{name} = {value} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Thresholds for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fraction above a moving average still counted as "near" it.
    pub ma_tolerance: f64,
    /// Minimum latest-volume / average-volume multiple.
    pub volume_threshold: f64,
    pub rsi_threshold: f64,
    pub use_ma: bool,
    pub use_rsi: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ma_tolerance: 0.05,
            volume_threshold: 1.5,
            rsi_threshold: 30.0,
            use_ma: true,
            use_rsi: false,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), FilterConfigError> {
        check_range("ma_tolerance", self.ma_tolerance, MA_TOLERANCE_RANGE)?;
        check_range("volume_threshold", self.volume_threshold, VOLUME_THRESHOLD_RANGE)?;
        check_range("rsi_threshold", self.rsi_threshold, RSI_THRESHOLD_RANGE)?;
        Ok(())
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    range: RangeInclusive<f64>,
) -> Result<(), FilterConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(FilterConfigError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// A single accept/reject rule over a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Close below any of MA20/MA50/MA200 scaled by `1 + tolerance`.
    NearMovingAverage { tolerance: f64 },
    VolumeSurge { threshold: f64 },
    /// RSI defined and at or below the ceiling.
    RsiCeiling { threshold: f64 },
}

impl Rule {
    pub fn accepts(&self, snap: &Snapshot) -> bool {
        match *self {
            Rule::NearMovingAverage { tolerance } => [snap.ma20, snap.ma50, snap.ma200]
                .into_iter()
                .flatten()
                .any(|ma| snap.close < ma * (1.0 + tolerance)),
            Rule::VolumeSurge { threshold } => snap.volume_ratio >= threshold,
            Rule::RsiCeiling { threshold } => snap.rsi.is_some_and(|rsi| rsi <= threshold),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::NearMovingAverage { tolerance } => {
                write!(f, "price within {:.0}% of a moving average", tolerance * 100.0)
            }
            Rule::VolumeSurge { threshold } => write!(f, "volume ratio >= {threshold:.2}"),
            Rule::RsiCeiling { threshold } => write!(f, "RSI <= {threshold:.0}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(Rule),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Conjunction of rules; a snapshot passes when every rule accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    rules: Vec<Rule>,
}

impl Predicate {
    pub fn all(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn evaluate(&self, snap: &Snapshot) -> Verdict {
        self.rules
            .iter()
            .find(|rule| !rule.accepts(snap))
            .map_or(Verdict::Accepted, |rule| Verdict::Rejected(*rule))
    }
}

impl From<&FilterConfig> for Predicate {
    fn from(config: &FilterConfig) -> Self {
        let mut rules = Vec::with_capacity(3);
        if config.use_ma {
            rules.push(Rule::NearMovingAverage {
                tolerance: config.ma_tolerance,
            });
        }
        rules.push(Rule::VolumeSurge {
            threshold: config.volume_threshold,
        });
        if config.use_rsi {
            rules.push(Rule::RsiCeiling {
                threshold: config.rsi_threshold,
            });
        }
        Self::all(rules)
    }
}
