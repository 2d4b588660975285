// src/simulation/results.rs
use num_complex::Complex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

/// Joint outcome of a list of expressions, ordered by `f64::total_cmp`.
#[derive(Debug, Clone)]
pub(crate) struct OutcomeKey(pub(crate) Vec<f64>);

impl OutcomeKey {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        // Adding 0.0 folds -0.0 into 0.0 so both land in the same bucket.
        Self(values.into_iter().map(|v| v + 0.0).collect())
    }
}

impl PartialEq for OutcomeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OutcomeKey {}

impl PartialOrd for OutcomeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OutcomeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Result of [`Simulator::measure_state`](super::Simulator::measure_state).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateOutcome {
    /// Whether the register was found in the requested state.
    pub outcome: bool,
    /// Probability of `outcome` before the projection.
    pub probability: f64,
}

/// Probability of every distinct joint outcome of a list of expressions.
///
/// Produced by [`Simulator::distribution`](super::Simulator::distribution);
/// entries are sorted by outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    labels: Vec<String>,
    entries: Vec<(Vec<f64>, f64)>,
}

impl Distribution {
    pub(crate) fn from_map(labels: Vec<String>, map: BTreeMap<OutcomeKey, f64>) -> Self {
        Self {
            labels,
            entries: map.into_iter().map(|(k, p)| (k.0, p)).collect(),
        }
    }

    /// Display labels of the expressions, in the order they were given.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(outcome, probability)` pairs sorted by outcome.
    pub fn entries(&self) -> &[(Vec<f64>, f64)] {
        &self.entries
    }

    /// Probability of one joint outcome (zero if it never occurs).
    pub fn probability(&self, outcome: &[f64]) -> f64 {
        let key = OutcomeKey::new(outcome.to_vec());
        self.entries
            .iter()
            .find(|(values, _)| OutcomeKey::new(values.clone()) == key)
            .map_or(0.0, |(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Distribution of [{}]:", self.labels.join(", "))?;
        for (values, p) in &self.entries {
            writeln!(f, "  {} w.p. {:.5}", format_outcome(values), p)?;
        }
        Ok(())
    }
}

/// The amplitudes of the branches sharing each joint outcome.
///
/// Produced by [`Simulator::amplitudes`](super::Simulator::amplitudes).
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeListing {
    labels: Vec<String>,
    entries: Vec<(Vec<f64>, Vec<Complex<f64>>)>,
}

impl AmplitudeListing {
    pub(crate) fn from_map(labels: Vec<String>, map: BTreeMap<OutcomeKey, Vec<Complex<f64>>>) -> Self {
        Self {
            labels,
            entries: map.into_iter().map(|(k, amps)| (k.0, amps)).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(outcome, amplitudes)` pairs sorted by outcome; amplitudes keep
    /// branch order.
    pub fn entries(&self) -> &[(Vec<f64>, Vec<Complex<f64>>)] {
        &self.entries
    }
}

impl fmt::Display for AmplitudeListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Amplitudes of [{}]:", self.labels.join(", "))?;
        for (values, amps) in &self.entries {
            let shown: Vec<String> = amps.iter().map(|a| format_amplitude(*a)).collect();
            writeln!(f, "  {} w.a. {}", format_outcome(values), shown.join(", "))?;
        }
        Ok(())
    }
}

fn format_outcome(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                format!("{}", v)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Polar form with common phases spelled out: `0.5`, `-0.5`, `1j*0.5`,
/// `0.5*e^(0.25*pi*i)`.
fn format_amplitude(amp: Complex<f64>) -> String {
    let (r, phi) = amp.to_polar();
    let turns = (phi / PI * 1e10).round() / 1e10;
    if phi == 0.0 || turns == 0.0 {
        return format!("{:.5}", r);
    }
    if (turns * 1e5).round() / 1e5 == turns {
        if turns.abs() == 1.0 {
            return format!("-{:.5}", r);
        }
        if turns == 0.5 {
            return format!("1j*{:.5}", r);
        }
        if turns == -0.5 {
            return format!("-1j*{:.5}", r);
        }
        return format!("{:.5}*e^({}*pi*i)", r, turns);
    }
    format!("{:.5}*e^(i*{:.6})", r, phi)
}
