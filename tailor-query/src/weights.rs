use std::fmt;

use crate::signals::Signal;

/// Linear boost weights: `base + count * increment`.
///
/// Weights grow without bound as interactions accumulate. `cap` is an opt-in
/// ceiling and is `None` unless configured explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    pub base_click: f64,
    pub increment_click: f64,
    pub base_term: f64,
    pub increment_term: f64,
    pub cap: Option<f64>,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            base_click: 1.0,
            increment_click: 0.2,
            base_term: 0.5,
            increment_term: 0.2,
            cap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeightError {
    NonPositive { name: &'static str, value: f64 },
    CapBelowBase { cap: f64, base: f64 },
}

impl fmt::Display for WeightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightError::NonPositive { name, value } => {
                write!(f, "{name} must be a finite value > 0 (got {value})")
            }
            WeightError::CapBelowBase { cap, base } => {
                write!(f, "weight cap {cap} is below base weight {base}")
            }
        }
    }
}

impl std::error::Error for WeightError {}

/// A ranked signal together with the boost it contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSignal {
    pub key: String,
    pub count: u64,
    pub weight: f64,
}

impl WeightConfig {
    /// Reject configurations that could yield a non-positive weight or make
    /// weight non-increasing in the count.
    pub fn validate(&self) -> Result<(), WeightError> {
        for (name, value) in [
            ("base_click", self.base_click),
            ("increment_click", self.increment_click),
            ("base_term", self.base_term),
            ("increment_term", self.increment_term),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(WeightError::NonPositive { name, value });
            }
        }
        if let Some(cap) = self.cap {
            let base = self.base_click.max(self.base_term);
            if !cap.is_finite() || cap < base {
                return Err(WeightError::CapBelowBase { cap, base });
            }
        }
        Ok(())
    }

    pub fn category_weight(&self, clicks: u64) -> f64 {
        self.capped(self.base_click + clicks as f64 * self.increment_click)
    }

    pub fn term_weight(&self, frequency: u64) -> f64 {
        self.capped(self.base_term + frequency as f64 * self.increment_term)
    }

    pub fn weigh_categories(&self, signals: &[Signal]) -> Vec<WeightedSignal> {
        signals
            .iter()
            .map(|s| WeightedSignal {
                key: s.key.clone(),
                count: s.count,
                weight: self.category_weight(s.count),
            })
            .collect()
    }

    pub fn weigh_terms(&self, signals: &[Signal]) -> Vec<WeightedSignal> {
        signals
            .iter()
            .map(|s| WeightedSignal {
                key: s.key.clone(),
                count: s.count,
                weight: self.term_weight(s.count),
            })
            .collect()
    }

    fn capped(&self, weight: f64) -> f64 {
        match self.cap {
            Some(cap) => weight.min(cap),
            None => weight,
        }
    }
}
