//! Per-request fact bindings
//!
//! Facts are a flat mapping from declared variable names to primitive values.
//! Names that do not match a declared variable are carried but ignored at
//! binding time (forward compatibility); mapping nested domain structures
//! onto the flat namespace is domain code and lives with the fixtures.

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};

/// A primitive value: a fact binding, constant, or model assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
        }
    }

    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(n) => Some(*n as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean view
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

/// Flat fact map for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facts(BTreeMap<String, Scalar>);

impl Facts {
    /// Create an empty fact map
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a fact binding
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a fact by name
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.0.get(name)
    }

    /// Iterate over bindings in name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Scalar> {
        self.0.iter()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse facts from a flat JSON object of primitives
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Exact rational decomposition of a finite float via its shortest decimal
/// rendering (`0.55` becomes `55/100`, not the nearest binary fraction).
/// Returns `None` for non-finite values or magnitudes that do not fit i64.
pub(crate) fn rational_parts(value: f64) -> Option<(i64, i64)> {
    if !value.is_finite() {
        return None;
    }
    decimal_to_rational(&format!("{}", value))
}

pub(crate) fn decimal_to_rational(text: &str) -> Option<(i64, i64)> {
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, text),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut num: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        num = num.checked_mul(10)?.checked_add(i128::from(b - b'0'))?;
        if num > i128::from(i64::MAX) {
            return None;
        }
    }
    let mut den: i128 = 1;
    for _ in 0..frac_part.len() {
        den = den.checked_mul(10)?;
        if den > i128::from(i64::MAX) {
            return None;
        }
    }

    Some(((sign * num) as i64, den as i64))
}

impl<'a> IntoIterator for &'a Facts {
    type Item = (&'a String, &'a Scalar);
    type IntoIter = btree_map::Iter<'a, String, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Scalar)> for Facts {
    fn from_iter<T: IntoIterator<Item = (String, Scalar)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_type_names() {
        assert_eq!(Scalar::Bool(true).type_name(), "bool");
        assert_eq!(Scalar::Int(5).type_name(), "int");
        assert_eq!(Scalar::Float(0.5).type_name(), "float");
        assert_eq!(Scalar::from("web").type_name(), "string");
    }

    #[test]
    fn test_scalar_views() {
        assert_eq!(Scalar::Int(5).as_f64(), Some(5.0));
        assert_eq!(Scalar::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(Scalar::Bool(true).as_f64(), None);
        assert_eq!(Scalar::Bool(true).as_bool(), Some(true));
        assert_eq!(Scalar::Int(5).as_bool(), None);
        assert_eq!(Scalar::Int(5).as_i64(), Some(5));
        assert_eq!(Scalar::Float(5.0).as_i64(), None);
    }

    #[test]
    fn test_facts_builder() {
        let facts = Facts::new().with("amount", 100.0).with("vel1h", 1_i64).with("cnp", false);

        assert_eq!(facts.len(), 3);
        assert_eq!(facts.get("amount"), Some(&Scalar::Float(100.0)));
        assert_eq!(facts.get("vel1h"), Some(&Scalar::Int(1)));
        assert_eq!(facts.get("cnp"), Some(&Scalar::Bool(false)));
        assert_eq!(facts.get("missing"), None);
    }

    #[test]
    fn test_facts_from_json() {
        let facts = Facts::from_json(json!({
            "amount": 100.5,
            "vel1h": 3,
            "cnp": true,
            "channel": "web"
        }))
        .unwrap();

        assert_eq!(facts.get("amount"), Some(&Scalar::Float(100.5)));
        assert_eq!(facts.get("vel1h"), Some(&Scalar::Int(3)));
        assert_eq!(facts.get("cnp"), Some(&Scalar::Bool(true)));
        assert_eq!(facts.get("channel"), Some(&Scalar::Str("web".to_string())));
    }

    #[test]
    fn test_facts_from_json_rejects_nested() {
        let result = Facts::from_json(json!({
            "account": { "available": 450.0 }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_rational_parts_exact_decimals() {
        assert_eq!(rational_parts(0.55), Some((55, 100)));
        assert_eq!(rational_parts(0.1), Some((1, 10)));
        assert_eq!(rational_parts(100.0), Some((100, 1)));
        assert_eq!(rational_parts(-0.5), Some((-5, 10)));
        assert_eq!(rational_parts(0.0), Some((0, 1)));
    }

    #[test]
    fn test_rational_parts_rejects_non_finite() {
        assert_eq!(rational_parts(f64::NAN), None);
        assert_eq!(rational_parts(f64::INFINITY), None);
        assert_eq!(rational_parts(f64::NEG_INFINITY), None);
    }

    #[test]
    fn test_rational_parts_rejects_overflow() {
        assert_eq!(rational_parts(1e300), None);
        assert_eq!(rational_parts(1e-300), None);
    }

    #[test]
    fn test_decimal_to_rational_rejects_malformed() {
        assert_eq!(decimal_to_rational(""), None);
        assert_eq!(decimal_to_rational("."), None);
        assert_eq!(decimal_to_rational("1e5"), None);
        assert_eq!(decimal_to_rational("abc"), None);
    }

    #[test]
    fn test_scalar_json_roundtrip() {
        let facts = Facts::new().with("a", true).with("b", 2_i64).with("c", 0.5);
        let text = serde_json::to_string(&facts).unwrap();
        let back: Facts = serde_json::from_str(&text).unwrap();
        assert_eq!(back, facts);
    }
}
