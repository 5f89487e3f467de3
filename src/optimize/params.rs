use crate::engine::ExecutionContext;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

//a single parameter assignment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Int(v) => *v as f64,
            ParamValue::Float(v) => *v,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            ParamValue::Int(v) => *v,
            ParamValue::Float(v) => v.round() as i64,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, ParamValue::Int(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

//searchable values in declared order
pub type ParamValues = IndexMap<String, ParamValue>;

//values for one trial plus the execution fields every trial shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub values: ParamValues,
    pub context: ExecutionContext,
}

impl ParameterSet {
    pub fn new(values: ParamValues, context: ExecutionContext) -> Self {
        ParameterSet { values, context }
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).map(|v| v.as_f64())
    }

    //value of the first name present
    pub fn first_of(&self, names: &[&str]) -> Option<f64> {
        names.iter().find_map(|name| self.get_f64(name))
    }

    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    //builder form of set
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }
}

//legal values of one searchable parameter
//step <= 0 on a float range means continuous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub name: String,
    #[serde(alias = "min_val")]
    pub min: f64,
    #[serde(alias = "max_val")]
    pub max: f64,
    #[serde(default)]
    pub step: f64,
    #[serde(default)]
    pub is_int: bool,
}

impl ParamRange {
    pub fn int(name: impl Into<String>, min: i64, max: i64, step: i64) -> Self {
        ParamRange {
            name: name.into(),
            min: min as f64,
            max: max as f64,
            step: step as f64,
            is_int: true,
        }
    }

    pub fn float(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        ParamRange {
            name: name.into(),
            min,
            max,
            step,
            is_int: false,
        }
    }

    //bounds derived from a known default value
    //int: [max(1, 0.5v), 3v] step 1, float: [0.5v, 3v] step 0.1v
    pub fn around_default(name: impl Into<String>, default: f64, is_int: bool) -> Self {
        if is_int {
            let min = ((default * 0.5).floor() as i64).max(1);
            let max = ((default * 3.0).floor() as i64).max(min);
            return ParamRange::int(name, min, max, 1);
        }

        let a = default * 0.5;
        let b = default * 3.0;
        let step = round4((default * 0.1).abs());
        ParamRange::float(name, a.min(b), a.max(b), step)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("parameter range with an empty name".to_string());
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err(format!("range for '{}' has non-finite bounds", self.name));
        }
        if self.min > self.max {
            return Err(format!(
                "range for '{}' has min {} above max {}",
                self.name, self.min, self.max
            ));
        }
        if !self.span().is_finite() {
            return Err(format!("range for '{}' is too wide", self.name));
        }
        if self.is_int && (self.min.abs() > MAX_EXACT_INT || self.max.abs() > MAX_EXACT_INT) {
            return Err(format!(
                "integer range for '{}' must stay within +/-{}",
                self.name, MAX_EXACT_INT
            ));
        }
        if self.is_int && self.int_bounds().0 > self.int_bounds().1 {
            return Err(format!(
                "range for '{}' holds no integer between {} and {}",
                self.name, self.min, self.max
            ));
        }
        Ok(())
    }

    //snaps a raw value to min + k*step inside [min, max]
    pub fn quantize(&self, value: f64) -> ParamValue {
        if self.is_int {
            let (min, max) = self.int_bounds();
            let step = self.int_step();
            let Some(span) = max.checked_sub(min) else {
                return ParamValue::Int(min);
            };
            let steps = span / step;
            let k = if value.is_finite() {
                (((value - min as f64) / step as f64).round() as i64).clamp(0, steps)
            } else {
                0
            };
            return ParamValue::Int(min + k * step);
        }

        let value = if value.is_finite() { value } else { self.min };
        if self.step <= 0.0 {
            return ParamValue::Float(value.clamp(self.min, self.max));
        }

        let steps = self.float_steps();
        let k = ((value - self.min) / self.step).round().clamp(0.0, steps);
        ParamValue::Float((self.min + k * self.step).clamp(self.min, self.max))
    }

    //uniform draw over the legal values
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        if self.is_int {
            let (min, max) = self.int_bounds();
            let step = self.int_step();
            let Some(span) = max.checked_sub(min) else {
                return ParamValue::Int(min);
            };
            let k = rng.random_range(0..=span / step);
            return ParamValue::Int(min + k * step);
        }

        if self.max <= self.min {
            return ParamValue::Float(self.min);
        }

        if self.step <= 0.0 {
            return ParamValue::Float(rng.random_range(self.min..=self.max));
        }

        let k = rng.random_range(0..=self.float_steps() as u64);
        ParamValue::Float((self.min + k as f64 * self.step).min(self.max))
    }

    //width of the range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    fn int_bounds(&self) -> (i64, i64) {
        (self.min.ceil() as i64, self.max.floor() as i64)
    }

    fn int_step(&self) -> i64 {
        (self.step.round() as i64).max(1)
    }

    fn float_steps(&self) -> f64 {
        ((self.max - self.min) / self.step + 1e-9).floor()
    }
}

//largest magnitude an f64 holds as an exact integer
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
