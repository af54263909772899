//! XES event log reader

use super::xml::{attributes, error, local_name};
use super::IngestError;
use crate::process::{EventLog, Trace};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

const NAME_KEY: &str = "concept:name";

#[derive(Default)]
struct Cursor {
    /// Local names of the open elements
    stack: Vec<String>,
    log: EventLog,
    trace: Option<Trace>,
    in_event: bool,
    /// `concept:name` of the open event
    activity: Option<String>,
    seen_log: bool,
    unnamed_events: usize,
}

impl Cursor {
    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn open(&mut self, element: &BytesStart<'_>, file_name: &str, position: u64) -> Result<(), IngestError> {
        let name = local_name(element.local_name().as_ref());
        match name.as_str() {
            "log" if self.stack.is_empty() => self.seen_log = true,
            "trace" if self.parent() == Some("log") => {
                self.trace = Some(Trace {
                    case_id: (self.log.traces.len() + 1).to_string(),
                    events: Vec::new(),
                });
            }
            "event" if self.parent() == Some("trace") => {
                self.in_event = true;
                self.activity = None;
            }
            "string" => {
                let attrs = attributes(element, file_name, position)?;
                if attrs.get("key").map(String::as_str) == Some(NAME_KEY) {
                    let value = attrs.get("value").cloned().unwrap_or_default();
                    match self.parent() {
                        Some("event") if self.in_event => self.activity = Some(value),
                        Some("trace") => {
                            if let Some(trace) = self.trace.as_mut() {
                                trace.case_id = value;
                            }
                        }
                        Some("log") if self.log.name.is_empty() => self.log.name = value,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else { return };
        match (name.as_str(), self.parent()) {
            ("event", Some("trace")) => {
                self.in_event = false;
                match self.activity.take() {
                    Some(activity) => {
                        if let Some(trace) = self.trace.as_mut() {
                            trace.events.push(activity);
                        }
                    }
                    None => self.unnamed_events += 1,
                }
            }
            ("trace", Some("log")) => {
                if let Some(trace) = self.trace.take() {
                    self.log.traces.push(trace);
                }
            }
            _ => {}
        }
    }
}

/// Parse an XES document. Events are named by their `concept:name`
/// attribute; events without one are skipped.
pub fn parse_xes<R: BufRead>(file_name: &str, input: R) -> Result<EventLog, IngestError> {
    let mut reader = Reader::from_reader(input);
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
            Ok(Event::End(_)) => cursor.close(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(error(file_name, reader.buffer_position(), &e)),
        }
        buf.clear();
    }

    let malformed = |message: &str| IngestError::Malformed {
        format: "XES",
        file_name: file_name.to_string(),
        message: message.to_string(),
    };
    if !cursor.stack.is_empty() {
        return Err(malformed("unexpected end of document"));
    }
    if !cursor.seen_log {
        return Err(malformed("root element is not <log>"));
    }
    if cursor.log.traces.is_empty() {
        return Err(malformed("log contains no traces"));
    }
    if cursor.unnamed_events > 0 {
        tracing::warn!(
            file_name = %file_name,
            skipped = cursor.unnamed_events,
            "Skipped events without concept:name"
        );
    }

    let mut log = cursor.log;
    if log.name.is_empty() {
        log.name = file_name.to_string();
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log xes.version="1.0">
  <extension name="Concept" prefix="concept" uri="http://www.xes-standard.org/concept.xesext"/>
  <string key="concept:name" value="orders"/>
  <trace>
    <string key="concept:name" value="order-1"/>
    <event>
      <string key="concept:name" value="place order"/>
      <date key="time:timestamp" value="2024-01-01T10:00:00"/>
    </event>
    <event><string key="concept:name" value="ship"/></event>
  </trace>
  <trace>
    <string key="concept:name" value="order-2"/>
    <event><string key="concept:name" value="place order"/></event>
    <event><string key="org:resource" value="clerk"/></event>
  </trace>
</log>"#;

    #[test]
    fn test_reads_traces_and_case_ids() {
        let log = parse_xes("orders.xes", ORDERS.as_bytes()).unwrap();

        assert_eq!(log.name, "orders");
        assert_eq!(log.len(), 2);
        assert_eq!(log.traces[0].case_id, "order-1");
        assert_eq!(log.traces[0].events, ["place order", "ship"]);
        // second event has no concept:name
        assert_eq!(log.traces[1].events, ["place order"]);
    }

    #[test]
    fn test_rejects_non_log_root() {
        let err = parse_xes("x.xes", "<definitions/>".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Malformed { .. }));
    }

    #[test]
    fn test_rejects_truncated_document() {
        let err = parse_xes("x.xes", "<log><trace><event>".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Malformed { .. } | IngestError::Xml { .. }));
    }

    #[test]
    fn test_rejects_log_without_traces() {
        let err = parse_xes("x.xes", "<log></log>".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no traces"));
    }
}
