//! Process tree to Petri net

use crate::process::{Marking, PetriNet, PetriNetWithMarkings, ProcessTree};

/// Translate a process tree into a workflow net with one source and one sink
/// place. Ids are assigned in traversal order, so equal trees produce equal
/// nets.
pub fn to_petri_net(tree: &ProcessTree) -> PetriNetWithMarkings {
    let mut builder = NetBuilder::default();
    let source = builder.place();
    let sink = builder.place();
    builder.weave(tree, &source, &sink);

    PetriNetWithMarkings {
        net: builder.net,
        initial: Marking::single(source),
        final_marking: Marking::single(sink),
    }
}

struct NetBuilder {
    net: PetriNet,
    places: usize,
    transitions: usize,
}

impl Default for NetBuilder {
    fn default() -> Self {
        Self {
            net: PetriNet::new("process_model"),
            places: 0,
            transitions: 0,
        }
    }
}

impl NetBuilder {
    fn place(&mut self) -> String {
        let id = format!("p_{}", self.places);
        self.places += 1;
        self.net.add_place(id)
    }

    fn transition(&mut self, label: Option<&str>) -> String {
        let id = format!("t_{}", self.transitions);
        self.transitions += 1;
        self.net.add_transition(id, label.map(str::to_string))
    }

    /// Connect `from` to `to` through a single transition
    fn step(&mut self, label: Option<&str>, from: &str, to: &str) -> String {
        let t = self.transition(label);
        self.net.add_arc(from, t.clone());
        self.net.add_arc(t.clone(), to);
        t
    }

    /// Add the fragment for `tree` between two existing places
    fn weave(&mut self, tree: &ProcessTree, from: &str, to: &str) {
        match tree {
            ProcessTree::Activity { label } => {
                self.step(Some(label), from, to);
            }
            ProcessTree::Silent => {
                self.step(None, from, to);
            }
            ProcessTree::Sequence { children } => {
                let mut current = from.to_string();
                for (i, child) in children.iter().enumerate() {
                    let next = if i + 1 == children.len() {
                        to.to_string()
                    } else {
                        self.place()
                    };
                    self.weave(child, &current, &next);
                    current = next;
                }
            }
            ProcessTree::Xor { children } => {
                for child in children {
                    self.weave(child, from, to);
                }
            }
            ProcessTree::Parallel { children } => {
                let split = self.transition(None);
                self.net.add_arc(from, split.clone());
                let mut exits = Vec::with_capacity(children.len());
                for child in children {
                    let entry = self.place();
                    let exit = self.place();
                    self.net.add_arc(split.clone(), entry.clone());
                    self.weave(child, &entry, &exit);
                    exits.push(exit);
                }
                let join = self.transition(None);
                for exit in exits {
                    self.net.add_arc(exit, join.clone());
                }
                self.net.add_arc(join, to);
            }
            ProcessTree::Loop { body, redo } => {
                // Dedicated loop places keep the back edge from leaking into
                // sibling branches that share `from` or `to`.
                let start = self.place();
                let end = self.place();
                self.step(None, from, &start);
                self.weave(body, &start, &end);
                self.weave(redo, &end, &start);
                self.step(None, &end, to);
            }
        }
    }
}
