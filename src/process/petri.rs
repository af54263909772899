//! Place/transition nets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
}

/// A transition; `label: None` marks a silent (tau) transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub label: Option<String>,
}

impl Transition {
    pub fn is_silent(&self) -> bool {
        self.label.is_none()
    }
}

/// Arc from a place to a transition or from a transition to a place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetArc {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetriNet {
    pub name: String,
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    pub arcs: Vec<NetArc>,
}

/// Tokens per place id; places without tokens are absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Marking(pub BTreeMap<String, u32>);

impl Marking {
    pub fn single(place: impl Into<String>) -> Self {
        let mut tokens = BTreeMap::new();
        tokens.insert(place.into(), 1);
        Self(tokens)
    }

    pub fn tokens(&self, place: &str) -> u32 {
        self.0.get(place).copied().unwrap_or(0)
    }

    pub fn add(&mut self, place: &str, count: u32) {
        if count > 0 {
            *self.0.entry(place.to_string()).or_default() += count;
        }
    }

    /// Remove tokens; returns false when the place holds fewer than asked
    pub fn take(&mut self, place: &str, count: u32) -> bool {
        match self.0.get_mut(place) {
            Some(n) if *n >= count => {
                *n -= count;
                if *n == 0 {
                    self.0.remove(place);
                }
                true
            }
            _ => count == 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PetriNet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_place(&mut self, id: impl Into<String>) -> String {
        let id = id.into();
        self.places.push(Place { id: id.clone() });
        id
    }

    pub fn add_transition(&mut self, id: impl Into<String>, label: Option<String>) -> String {
        let id = id.into();
        self.transitions.push(Transition {
            id: id.clone(),
            label,
        });
        id
    }

    pub fn add_arc(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.arcs.push(NetArc {
            source: source.into(),
            target: target.into(),
        });
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Ids of nodes with an arc into `node`
    pub fn preset(&self, node: &str) -> Vec<&str> {
        self.arcs
            .iter()
            .filter(|a| a.target == node)
            .map(|a| a.source.as_str())
            .collect()
    }

    /// Ids of nodes with an arc out of `node`
    pub fn postset(&self, node: &str) -> Vec<&str> {
        self.arcs
            .iter()
            .filter(|a| a.source == node)
            .map(|a| a.target.as_str())
            .collect()
    }

    pub fn is_enabled(&self, transition: &str, marking: &Marking) -> bool {
        self.preset(transition)
            .into_iter()
            .all(|p| marking.tokens(p) > 0)
    }

    pub fn enabled<'a>(&'a self, marking: &Marking) -> Vec<&'a Transition> {
        self.transitions
            .iter()
            .filter(|t| self.is_enabled(&t.id, marking))
            .collect()
    }

    /// Marking after firing `transition`, or `None` if it is not enabled
    pub fn fire(&self, transition: &str, marking: &Marking) -> Option<Marking> {
        let mut next = marking.clone();
        for place in self.preset(transition) {
            if !next.take(place, 1) {
                return None;
            }
        }
        for place in self.postset(transition) {
            next.add(place, 1);
        }
        Some(next)
    }
}

/// Net together with its initial and final markings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetriNetWithMarkings {
    pub net: PetriNet,
    pub initial: Marking,
    pub final_marking: Marking,
}

impl PetriNetWithMarkings {
    /// Infer markings from the structure: places without incoming arcs start
    /// with a token, places without outgoing arcs end with one
    pub fn with_inferred_markings(net: PetriNet) -> Self {
        let mut initial = Marking::default();
        let mut final_marking = Marking::default();
        for place in &net.places {
            if net.preset(&place.id).is_empty() {
                initial.add(&place.id, 1);
            }
            if net.postset(&place.id).is_empty() {
                final_marking.add(&place.id, 1);
            }
        }
        Self {
            net,
            initial,
            final_marking,
        }
    }
}
