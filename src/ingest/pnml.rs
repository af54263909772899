//! PNML reader

use super::xml::{attributes, decode, error, local_name};
use super::IngestError;
use crate::convert::INVISIBLE_ACTIVITY;
use crate::process::{Marking, PetriNet, PetriNetWithMarkings};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Default)]
struct Cursor {
    stack: Vec<String>,
    net: PetriNet,
    initial: Marking,
    final_marking: Marking,
    has_final: bool,
    /// Id of the open place or transition
    current: Option<String>,
    /// Place referenced inside `<finalmarkings>`
    final_place: Option<String>,
    invisible: Vec<String>,
    names: Vec<(String, String)>,
}

impl Cursor {
    fn within(&self, name: &str) -> bool {
        self.stack.iter().any(|s| s == name)
    }

    fn open(&mut self, element: &BytesStart<'_>, file_name: &str, position: u64) -> Result<(), IngestError> {
        let name = local_name(element.local_name().as_ref());
        let attrs = attributes(element, file_name, position)?;
        let id = attrs.get("id").cloned().unwrap_or_default();

        match name.as_str() {
            "net" if self.net.name.is_empty() => self.net.name.clone_from(&id),
            "finalmarkings" => self.has_final = true,
            "place" if self.within("finalmarkings") => {
                self.final_place = attrs.get("idref").cloned();
            }
            "place" => {
                self.net.add_place(id.clone());
                self.current = Some(id);
            }
            "transition" => {
                self.net.add_transition(id.clone(), None);
                self.current = Some(id);
            }
            "arc" => {
                let source = attrs.get("source").cloned().unwrap_or_default();
                let target = attrs.get("target").cloned().unwrap_or_default();
                self.net.add_arc(source, target);
            }
            "toolspecific" => {
                if attrs.get("activity").map(String::as_str) == Some(INVISIBLE_ACTIVITY) {
                    if let Some(current) = &self.current {
                        self.invisible.push(current.clone());
                    }
                }
            }
            _ => {}
        }
        self.stack.push(name);
        Ok(())
    }

    fn text(&mut self, value: &str, file_name: &str) -> Result<(), IngestError> {
        let value = value.trim();
        let depth = self.stack.len();
        if depth < 2 || self.stack[depth - 1] != "text" {
            return Ok(());
        }
        let owner = self.stack[depth - 2].as_str();
        let tokens = || {
            value.parse::<u32>().map_err(|_| IngestError::Malformed {
                format: "PNML",
                file_name: file_name.to_string(),
                message: format!("invalid token count '{value}'"),
            })
        };
        match owner {
            "initialMarking" => {
                if let Some(place) = &self.current {
                    self.initial.add(place, tokens()?);
                }
            }
            "place" if self.within("finalmarkings") => {
                if let Some(place) = &self.final_place {
                    self.final_marking.add(place, tokens()?);
                }
            }
            "name" if depth >= 3 && self.stack[depth - 3] == "transition" => {
                if let Some(transition) = &self.current {
                    self.names.push((transition.clone(), value.to_string()));
                }
            }
            "name" if depth >= 3 && self.stack[depth - 3] == "net" => {
                self.net.name = value.to_string();
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(name) = self.stack.pop() {
            if matches!(name.as_str(), "place" | "transition") && !self.within("finalmarkings") {
                self.current = None;
            }
        }
    }
}

/// Parse a PNML core model. Markings missing from the document are inferred
/// from the net structure.
pub fn parse_pnml(file_name: &str, bytes: &[u8]) -> Result<PetriNetWithMarkings, IngestError> {
    let text = decode(bytes);
    let mut reader = Reader::from_reader(text.as_ref());
    reader.config_mut().trim_text(true);

    let mut cursor = Cursor::default();
    let mut buf = Vec::new();
    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => cursor.open(&e, file_name, position)?,
            Ok(Event::Empty(e)) => {
                cursor.open(&e, file_name, position)?;
                cursor.close();
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| error(file_name, reader.buffer_position(), &e))?;
                cursor.text(&value, file_name)?;
            }
            Ok(Event::End(_)) => cursor.close(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(error(file_name, reader.buffer_position(), &e)),
        }
        buf.clear();
    }

    let malformed = |message: String| IngestError::Malformed {
        format: "PNML",
        file_name: file_name.to_string(),
        message,
    };
    let mut net = cursor.net;
    if net.places.is_empty() || net.transitions.is_empty() {
        return Err(malformed("net has no places or no transitions".to_string()));
    }
    for arc in &net.arcs {
        let place_to_transition =
            net.place(&arc.source).is_some() && net.transition(&arc.target).is_some();
        let transition_to_place =
            net.transition(&arc.source).is_some() && net.place(&arc.target).is_some();
        if !place_to_transition && !transition_to_place {
            return Err(malformed(format!(
                "arc {} -> {} does not connect a place and a transition",
                arc.source, arc.target
            )));
        }
    }

    for (transition, label) in cursor.names {
        if cursor.invisible.contains(&transition) || label.is_empty() {
            continue;
        }
        if let Some(t) = net.transitions.iter_mut().find(|t| t.id == transition) {
            t.label = Some(label);
        }
    }
    if net.name.is_empty() {
        net.name = file_name.to_string();
    }

    let inferred = PetriNetWithMarkings::with_inferred_markings(net);
    let initial = if cursor.initial.is_empty() {
        inferred.initial
    } else {
        cursor.initial
    };
    let final_marking = if cursor.has_final && !cursor.final_marking.is_empty() {
        cursor.final_marking
    } else {
        inferred.final_marking
    };
    if initial.is_empty() {
        return Err(malformed("no initial marking and no source place".to_string()));
    }

    Ok(PetriNetWithMarkings {
        net: inferred.net,
        initial,
        final_marking,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{serialize_pnml, to_petri_net};
    use crate::process::ProcessTree;

    #[test]
    fn test_reads_back_exported_net() {
        let tree = ProcessTree::sequence(vec![
            ProcessTree::activity("register"),
            ProcessTree::looped(ProcessTree::activity("check"), ProcessTree::Silent),
        ]);
        let marked = to_petri_net(&tree);
        let bytes = serialize_pnml(&marked.net, &marked.initial, &marked.final_marking).unwrap();

        let parsed = parse_pnml("model.pnml", &bytes).unwrap();
        assert_eq!(parsed.net.places, marked.net.places);
        assert_eq!(parsed.net.transitions, marked.net.transitions);
        assert_eq!(parsed.net.arcs, marked.net.arcs);
        assert_eq!(parsed.initial, marked.initial);
        assert_eq!(parsed.final_marking, marked.final_marking);
    }

    #[test]
    fn test_infers_missing_markings() {
        let xml = r#"<pnml><net id="n"><page id="p">
            <place id="start"/><place id="end"/>
            <transition id="t"><name><text>work</text></name></transition>
            <arc id="a1" source="start" target="t"/><arc id="a2" source="t" target="end"/>
        </page></net></pnml>"#;

        let parsed = parse_pnml("n.pnml", xml.as_bytes()).unwrap();
        assert_eq!(parsed.initial, Marking::single("start"));
        assert_eq!(parsed.final_marking, Marking::single("end"));
        assert_eq!(parsed.net.transitions[0].label.as_deref(), Some("work"));
    }

    #[test]
    fn test_rejects_place_to_place_arc() {
        let xml = r#"<pnml><net id="n"><page id="p">
            <place id="a"/><place id="b"/><transition id="t"/>
            <arc id="x" source="a" target="b"/>
        </page></net></pnml>"#;
        assert!(parse_pnml("n.pnml", xml.as_bytes()).is_err());
    }
}
