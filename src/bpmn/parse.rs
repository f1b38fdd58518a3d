/// Extraction of release information from a workflow definition
///
/// Plain start events contribute the start form of the process. Message start
/// events are maintenance procedures, addressed by the name of the message they
/// reference.

use crate::bpmn::{deployment_key, maintenance_event_id, xml_error};
use crate::error::{Error, Result};
use crate::model::{MaintenanceProcedure, ParameterDescription, ParsedInfo};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{HashMap, HashSet};

/// Start event collected while walking the document
#[derive(Debug, Default)]
struct StartEvent {
    id: String,
    name: String,
    message_ref: Option<String>,
    fields: Vec<ParameterDescription>,
}

/// Parse the start parameters and maintenance procedures of a definition
///
/// Internal event ids are derived from the release's deployment key, so the
/// result is the same on every call for the same release.
pub fn parse_release_info(definition: &str, release_id: &str) -> Result<ParsedInfo> {
    let key = deployment_key(release_id);
    let mut reader = Reader::from_str(definition);

    let mut messages: HashMap<String, String> = HashMap::new();
    let mut start_events: Vec<StartEvent> = Vec::new();
    let mut current: Option<StartEvent> = None;
    let mut process_count = 0usize;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"startEvent" => current = Some(start_event(&e)?),
                other => visit(other, &e, &mut current, &mut messages, &mut process_count)?,
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"startEvent" => start_events.push(start_event(&e)?),
                other => visit(other, &e, &mut current, &mut messages, &mut process_count)?,
            },
            Event::End(e) => {
                if e.local_name().as_ref() == b"startEvent" {
                    if let Some(done) = current.take() {
                        start_events.push(done);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if process_count == 0 {
        return Err(Error::InvalidDefinition(
            "definition contains no process element".to_string(),
        ));
    }

    let mut info = ParsedInfo::default();
    let mut seen_public_ids = HashSet::new();

    for event in start_events {
        let Some(message_ref) = event.message_ref else {
            info.parameter_descriptions.extend(event.fields);
            continue;
        };

        let public_event_id = messages
            .get(&message_ref)
            .cloned()
            .ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "unknown maintenance message reference {:?} in start event {:?}",
                    message_ref, event.id
                ))
            })?;
        if public_event_id.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "message {:?} used by start event {:?} has no name",
                message_ref, event.id
            )));
        }
        if !seen_public_ids.insert(public_event_id.clone()) {
            return Err(Error::InvalidDefinition(format!(
                "maintenance message {:?} is used by more than one start event",
                public_event_id
            )));
        }

        info.maintenance_procedures.push(MaintenanceProcedure {
            bpmn_id: event.id,
            name: event.name,
            internal_event_id: maintenance_event_id(&key, &public_event_id),
            public_event_id,
            parameter_descriptions: event.fields,
        });
    }

    Ok(info)
}

fn visit(
    local_name: &[u8],
    e: &BytesStart<'_>,
    current: &mut Option<StartEvent>,
    messages: &mut HashMap<String, String>,
    process_count: &mut usize,
) -> Result<()> {
    match local_name {
        b"process" => *process_count += 1,
        b"message" => {
            let attrs = attributes(e)?;
            if let Some(id) = attrs.get("id") {
                messages.insert(id.clone(), attrs.get("name").cloned().unwrap_or_default());
            }
        }
        b"messageEventDefinition" => {
            if let Some(event) = current.as_mut() {
                event.message_ref = attributes(e)?.remove("messageRef");
            }
        }
        b"formField" => {
            if let Some(event) = current.as_mut() {
                let mut attrs = attributes(e)?;
                let id = attrs.remove("id").unwrap_or_default();
                event.fields.push(ParameterDescription {
                    label: attrs.remove("label").unwrap_or_else(|| id.clone()),
                    value_type: attrs.remove("type").unwrap_or_else(|| "string".to_string()),
                    default_value: attrs.remove("defaultValue"),
                    id,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn start_event(e: &BytesStart<'_>) -> Result<StartEvent> {
    let mut attrs = attributes(e)?;
    Ok(StartEvent {
        id: attrs.remove("id").unwrap_or_default(),
        name: attrs.remove("name").unwrap_or_default(),
        ..StartEvent::default()
    })
}

/// Attributes keyed by local name, values unescaped
fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}
