//! Offline-tuned probability tables
//!
//! A table maps a uniform draw in [0, 1) to a model through cumulative
//! bands. Tables are keyed by `<selector>/<dataset>` and can be extended
//! or overridden from configuration.

use serde::Deserialize;
use std::collections::HashMap;

/// One cumulative probability band
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Band {
    /// Inclusive upper edge of the band's cumulative probability
    pub upper: f64,
    pub model: String,
}

impl Band {
    pub fn new(upper: f64, model: impl Into<String>) -> Self {
        Self {
            upper,
            model: model.into(),
        }
    }
}

/// Ordered bands for one deployment/dataset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbabilityTable {
    bands: Vec<Band>,
}

impl ProbabilityTable {
    pub fn new(bands: Vec<Band>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Model of the first band whose upper edge covers `draw`; the last band catches the rest
    pub fn pick(&self, draw: f64) -> Option<&str> {
        self.bands
            .iter()
            .find(|b| draw <= b.upper)
            .or_else(|| self.bands.last())
            .map(|b| b.model.as_str())
    }
}

/// Registry of tables keyed by `<selector>/<dataset>`
#[derive(Debug, Clone, Default)]
pub struct ProbabilityTables {
    tables: HashMap<String, ProbabilityTable>,
}

impl ProbabilityTables {
    /// Tables tuned offline for the Twitter (`sbac`) and DNS traces plus their averages
    pub fn builtin() -> Self {
        let three = |ann: f64, bayesian: f64| {
            ProbabilityTable::new(vec![
                Band::new(ann, "ann"),
                Band::new(bayesian, "bayesian"),
                Band::new(1.0, "sgd"),
            ])
        };

        let mut tables = HashMap::new();
        tables.insert("greedy/sbac".to_string(), three(0.687, 0.932));
        tables.insert("greedy/dns".to_string(), three(0.615, 0.687));
        tables.insert("greedy/avg".to_string(), three(0.651, 0.79));
        tables.insert("ucb/sbac".to_string(), three(0.687, 0.932));
        tables.insert("ucb/dns".to_string(), three(0.167, 0.296));
        tables.insert("ucb/avg".to_string(), three(0.276, 0.709));
        Self { tables }
    }

    /// Add or replace tables from configuration
    pub fn extend(&mut self, extra: HashMap<String, Vec<Band>>) {
        for (key, bands) in extra {
            self.tables.insert(key, ProbabilityTable::new(bands));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ProbabilityTable> {
        self.tables.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_follows_cumulative_bands() {
        let tables = ProbabilityTables::builtin();
        let dns = tables.get("ucb/dns").unwrap();
        assert_eq!(dns.pick(0.1), Some("ann"));
        assert_eq!(dns.pick(0.167), Some("ann"));
        assert_eq!(dns.pick(0.2), Some("bayesian"));
        assert_eq!(dns.pick(0.99), Some("sgd"));
    }

    #[test]
    fn test_last_band_catches_overflow() {
        let table = ProbabilityTable::new(vec![Band::new(0.3, "a"), Band::new(0.6, "b")]);
        assert_eq!(table.pick(0.9), Some("b"));
        assert_eq!(ProbabilityTable::default().pick(0.5), None);
    }

    #[test]
    fn test_builtin_keys() {
        let tables = ProbabilityTables::builtin();
        let mut keys: Vec<_> = tables.keys().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["greedy/avg", "greedy/dns", "greedy/sbac", "ucb/avg", "ucb/dns", "ucb/sbac"]
        );
    }

    #[test]
    fn test_extend_overrides_builtin() {
        let mut tables = ProbabilityTables::builtin();
        let mut extra = HashMap::new();
        extra.insert("ucb/dns".to_string(), vec![Band::new(1.0, "fft")]);
        extra.insert("ucb/nasa".to_string(), vec![Band::new(1.0, "ridge")]);
        tables.extend(extra);

        assert_eq!(tables.get("ucb/dns").unwrap().pick(0.1), Some("fft"));
        assert_eq!(tables.get("ucb/nasa").unwrap().pick(0.5), Some("ridge"));
    }
}
