//! Circuit labels and layer sequences.
//!
//! A [`Circuit`] is the sequence of layer labels applied between state
//! preparation and measurement, e.g. `GxGxGy`. Germ-power circuits used by
//! long-sequence GST are built with [`Circuit::repeat_to_max_length`]: the
//! germ is repeated `floor(L / germ_len)` times so the repeated block never
//! exceeds the max length L.
//!
//! The canonical string form is the concatenation of labels, with `(...)^n`
//! for repeated blocks and `{}` for the empty circuit. Circuits serialize as
//! that string, which keeps dataset files human-readable.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::GstError;

/// A layer label: a gate name such as `Gx`, or an instrument name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A sequence of layer labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Circuit {
    layers: SmallVec<[Label; 6]>,
}

impl Circuit {
    /// The empty circuit (prepare, then measure immediately).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_labels<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Self { layers: labels.into_iter().map(Into::into).collect() }
    }

    /// Convenience constructor from gate-name strings.
    pub fn from_names(names: &[&str]) -> Self {
        Self::from_labels(names.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Label] {
        &self.layers
    }

    /// `self` followed by `other`.
    pub fn then(&self, other: &Circuit) -> Circuit {
        let mut layers = self.layers.clone();
        layers.extend(other.layers.iter().cloned());
        Circuit { layers }
    }

    /// `self` repeated `n` times.
    pub fn repeated(&self, n: usize) -> Circuit {
        let mut layers = SmallVec::new();
        for _ in 0..n {
            layers.extend(self.layers.iter().cloned());
        }
        Circuit { layers }
    }

    /// Germ-power truncation: repeat so the result does not exceed
    /// `max_length` layers. A germ longer than `max_length` yields the empty
    /// circuit.
    pub fn repeat_to_max_length(&self, max_length: usize) -> Circuit {
        if self.is_empty() {
            return Circuit::empty();
        }
        self.repeated(max_length / self.len())
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.layers.is_empty() {
            return write!(f, "{{}}");
        }
        for label in &self.layers {
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

impl FromStr for Circuit {
    type Err = GstError;

    /// Parse the canonical string form: concatenated labels, `(...)^n`
    /// groups, `{}` for empty. Labels begin with an uppercase letter followed
    /// by lowercase letters, digits or underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "{}" {
            return Ok(Circuit::empty());
        }
        let chars: Vec<char> = s.chars().collect();
        let mut layers: SmallVec<[Label; 6]> = SmallVec::new();
        let mut pos = 0;

        while pos < chars.len() {
            match chars[pos] {
                '(' => {
                    let close = find_matching_paren(&chars, pos)
                        .ok_or_else(|| GstError::Parse(format!("unmatched '(' in '{}'", s)))?;
                    let inner: String = chars[pos + 1..close].iter().collect();
                    let group = Circuit::from_str(&inner)?;
                    pos = close + 1;
                    let mut reps = 1usize;
                    if pos < chars.len() && chars[pos] == '^' {
                        pos += 1;
                        let start = pos;
                        while pos < chars.len() && chars[pos].is_ascii_digit() {
                            pos += 1;
                        }
                        if start == pos {
                            return Err(GstError::Parse(format!("missing exponent in '{}'", s)));
                        }
                        let digits: String = chars[start..pos].iter().collect();
                        reps = digits
                            .parse()
                            .map_err(|_| GstError::Parse(format!("bad exponent in '{}'", s)))?;
                    }
                    for _ in 0..reps {
                        layers.extend(group.layers.iter().cloned());
                    }
                }
                c if c.is_ascii_uppercase() => {
                    let start = pos;
                    pos += 1;
                    while pos < chars.len()
                        && (chars[pos].is_ascii_lowercase()
                            || chars[pos].is_ascii_digit()
                            || chars[pos] == '_')
                    {
                        pos += 1;
                    }
                    let name: String = chars[start..pos].iter().collect();
                    layers.push(Label::new(name));
                }
                c if c.is_whitespace() => {
                    pos += 1;
                }
                c => {
                    return Err(GstError::Parse(format!(
                        "unexpected character '{}' in circuit '{}'",
                        c, s
                    )));
                }
            }
        }
        Ok(Circuit { layers })
    }
}

fn find_matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl Serialize for Circuit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Circuit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Circuit::from_str(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        let c = Circuit::from_names(&["Gx", "Gx", "Gy"]);
        assert_eq!(c.to_string(), "GxGxGy");
        let parsed: Circuit = "GxGxGy".parse().unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn empty_circuit_round_trips() {
        let c = Circuit::empty();
        assert_eq!(c.to_string(), "{}");
        let parsed: Circuit = "{}".parse().unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn parenthesized_powers_expand() {
        let parsed: Circuit = "(GxGy)^2Gi".parse().unwrap();
        assert_eq!(parsed, Circuit::from_names(&["Gx", "Gy", "Gx", "Gy", "Gi"]));
    }

    #[test]
    fn bad_input_is_a_parse_error() {
        assert!("(GxGy".parse::<Circuit>().is_err());
        assert!("Gx)".parse::<Circuit>().is_err());
        assert!("(Gx)^".parse::<Circuit>().is_err());
        assert!("gx".parse::<Circuit>().is_err());
    }

    #[test]
    fn repeat_to_max_length_truncates() {
        let germ = Circuit::from_names(&["Gx", "Gy"]);
        assert_eq!(germ.repeat_to_max_length(1).len(), 0);
        assert_eq!(germ.repeat_to_max_length(2).len(), 2);
        assert_eq!(germ.repeat_to_max_length(5).len(), 4);
        assert_eq!(germ.repeat_to_max_length(8).len(), 8);
    }

    #[test]
    fn serde_uses_string_form() {
        let c = Circuit::from_names(&["Gx", "Gy"]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"GxGy\"");
        let back: Circuit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
