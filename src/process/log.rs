//! Event logs

use std::collections::{BTreeMap, BTreeSet};

/// One case: the ordered activity names it executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub case_id: String,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    pub name: String,
    pub traces: Vec<Trace>,
}

impl EventLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traces: Vec::new(),
        }
    }

    /// Build a log from plain activity sequences, numbering the cases
    pub fn from_sequences<I, S>(name: impl Into<String>, sequences: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let traces = sequences
            .into_iter()
            .enumerate()
            .map(|(i, seq)| Trace {
                case_id: (i + 1).to_string(),
                events: seq.into_iter().map(Into::into).collect(),
            })
            .collect();
        Self {
            name: name.into(),
            traces,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn activities(&self) -> BTreeSet<&str> {
        self.traces
            .iter()
            .flat_map(|t| t.events.iter().map(String::as_str))
            .collect()
    }

    /// Distinct traces with their frequency
    pub fn variants(&self) -> BTreeMap<&[String], usize> {
        let mut variants: BTreeMap<&[String], usize> = BTreeMap::new();
        for trace in &self.traces {
            *variants.entry(trace.events.as_slice()).or_default() += 1;
        }
        variants
    }
}
