/// Binding a workflow definition to its deployment
///
/// The deployed definition must carry the release's deployment key as process id
/// and listen for maintenance messages under release-scoped names, so that two
/// releases of the same design never share a key or a message name on the engine.

use crate::bpmn::xml_error;
use crate::error::{Error, Result};
use crate::model::MaintenanceProcedure;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::{HashMap, HashSet};

/// Public message name -> release-scoped message name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceBinding {
    pub public_event_id: String,
    pub internal_event_id: String,
}

impl From<&MaintenanceProcedure> for MaintenanceBinding {
    fn from(procedure: &MaintenanceProcedure) -> Self {
        Self {
            public_event_id: procedure.public_event_id.clone(),
            internal_event_id: procedure.internal_event_id.clone(),
        }
    }
}

/// Attribute rewrites applied while copying the document
struct Rewrite<'a> {
    /// Authored process id -> deployed process id
    process_ids: HashMap<String, String>,
    /// Authored id of the process that receives the deployment key
    main_process: String,
    /// Public message name -> internal message name
    messages: HashMap<&'a str, &'a str>,
}

/// Rewrite `definition` so that it deploys under `key`
///
/// The first process gets `key` as id and is made executable, further processes
/// get `key-N`; diagram and collaboration references follow. Messages named by a
/// binding get the binding's internal event id. A binding without a matching
/// message is a definition error.
pub fn bind_release(definition: &str, key: &str, bindings: &[MaintenanceBinding]) -> Result<String> {
    let (process_ids, message_names) = scan(definition)?;

    let main_process = process_ids
        .first()
        .cloned()
        .ok_or_else(|| Error::InvalidDefinition("definition contains no process element".to_string()))?;

    for binding in bindings {
        if !message_names.contains(binding.public_event_id.as_str()) {
            return Err(Error::InvalidDefinition(format!(
                "unknown maintenance message reference {:?}",
                binding.public_event_id
            )));
        }
    }

    let rewrite = Rewrite {
        process_ids: process_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let deployed = if i == 0 { key.to_string() } else { format!("{}-{}", key, i) };
                (id.clone(), deployed)
            })
            .collect(),
        main_process,
        messages: bindings
            .iter()
            .map(|b| (b.public_event_id.as_str(), b.internal_event_id.as_str()))
            .collect(),
    };

    let mut reader = Reader::from_str(definition);
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        match event {
            Event::Start(e) => {
                let rewritten = rewrite.element(&e)?;
                writer.write_event(Event::Start(rewritten)).map_err(xml_error)?;
            }
            Event::Empty(e) => {
                let rewritten = rewrite.element(&e)?;
                writer.write_event(Event::Empty(rewritten)).map_err(xml_error)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(xml_error)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

/// Collect process ids (document order) and message names
fn scan(definition: &str) -> Result<(Vec<String>, HashSet<String>)> {
    let mut reader = Reader::from_str(definition);
    let mut process_ids = Vec::new();
    let mut message_names = HashSet::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"process" => {
                    let id = attribute(&e, "id")?.ok_or_else(|| {
                        Error::InvalidDefinition("process element without id".to_string())
                    })?;
                    process_ids.push(id);
                }
                b"message" => {
                    if let Some(name) = attribute(&e, "name")? {
                        message_names.insert(name);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((process_ids, message_names))
}

impl Rewrite<'_> {
    fn element(&self, e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
        let qualified = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let local = e.local_name();
        let is_process = local.as_ref() == b"process";
        let is_message = local.as_ref() == b"message";
        let is_main = is_process && attribute(e, "id")?.as_deref() == Some(self.main_process.as_str());

        let mut out = BytesStart::new(qualified);
        let mut saw_executable = false;

        for attr in e.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let attr_local = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();

            let replacement = match attr_local.as_str() {
                "id" if is_process => self.process_ids.get(&value).cloned(),
                "processRef" | "bpmnElement" => self.process_ids.get(&value).cloned(),
                "name" if is_message => self.messages.get(value.as_str()).map(|s| s.to_string()),
                // the main process has to be executable, whatever the author set
                "isExecutable" if is_main => {
                    saw_executable = true;
                    Some("true".to_string())
                }
                _ => None,
            };

            match replacement {
                Some(new_value) => out.push_attribute((key.as_str(), new_value.as_str())),
                None => out.push_attribute(attr),
            }
        }

        if is_main && !saw_executable {
            out.push_attribute(("isExecutable", "true"));
        }

        Ok(out)
    }
}

fn attribute(e: &BytesStart<'_>, local_name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == local_name.as_bytes() {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}
