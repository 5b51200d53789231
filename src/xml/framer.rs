//! Incremental reconstruction of complete top-level INDI messages from a
//! byte stream that has no enclosing document root.
//!
//! Grounded on `pyindi/client/xml_handler.py`'s `XMLHandler`, which drives
//! an `xml.sax` incremental parser the same way: track a "current root"
//! element by tag, accumulate children under it, and fire a callback only
//! once the root's matching end tag arrives. Rebuilt here on
//! [`quick_xml::Reader`]'s pull API rather than `xml.sax`, and returning
//! frames instead of invoking callbacks directly.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// One complete top-level element pulled out of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `def*Vector`: full definition. Carries the tag name (so the
    /// caller can tell which of the five kinds it is) and the raw XML.
    Def { tag: String, xml: String },
    /// `set*Vector`: a state update.
    Set { tag: String, xml: String },
    /// `new*Vector`: a client request (only seen on loopback/test wiring;
    /// a real driver never sends this to a client).
    New { tag: String, xml: String },
    /// `delProperty`: a property, or a whole device, going away.
    Del {
        device: String,
        name: Option<String>,
    },
    /// `message`: a free-form log line, optionally property-scoped.
    Message {
        device: Option<String>,
        message: Option<String>,
        timestamp: Option<String>,
    },
}

/// Stateful incremental parser. Feed it arbitrarily-chunked bytes; it
/// returns every frame that became complete as a result, and keeps any
/// trailing partial element buffered for the next call.
#[derive(Debug, Default)]
pub struct XmlFramer {
    buffer: Vec<u8>,
}

impl XmlFramer {
    /// A framer with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every frame that is now complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered, not-yet-complete bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        let text = match std::str::from_utf8(&self.buffer) {
            Ok(t) => t,
            // A multi-byte character split across feed() calls; wait for
            // the rest rather than erroring out.
            Err(_) => return Ok(None),
        };

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut root_tag: Option<String> = None;
        let mut start_pos = 0usize;
        let mut depth = 0u32;

        loop {
            let pos_before = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Eof) => return Ok(None),
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if root_tag.is_none() {
                        if !is_indi_tag(&name) {
                            continue;
                        }
                        root_tag = Some(name);
                        start_pos = pos_before;
                        depth = 1;
                    } else {
                        depth += 1;
                    }
                }
                Ok(Event::Empty(e)) => {
                    if root_tag.is_none() {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        if !is_indi_tag(&name) {
                            continue;
                        }
                        let end_pos = reader.buffer_position() as usize;
                        let xml = text[pos_before..end_pos].to_string();
                        self.buffer.drain(..end_pos);
                        return Ok(Some(classify(&name, xml)?));
                    }
                }
                Ok(Event::End(_)) => {
                    if root_tag.is_some() {
                        depth -= 1;
                        if depth == 0 {
                            let end_pos = reader.buffer_position() as usize;
                            let tag = root_tag.take().expect("checked Some above");
                            let xml = text[start_pos..end_pos].to_string();
                            self.buffer.drain(..end_pos);
                            return Ok(Some(classify(&tag, xml)?));
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(Error::ParseError(e.to_string())),
            }
        }
    }
}

/// `true` for the prefixes the DTD actually uses at the top level.
fn is_indi_tag(name: &str) -> bool {
    for prefix in ["def", "set", "new", "message", "delProperty"] {
        if name.starts_with(prefix) {
            return true;
        }
    }
    false
}

fn classify(tag: &str, xml: String) -> Result<Frame> {
    if tag == "delProperty" {
        let attrs = root_attrs(&xml)?;
        return Ok(Frame::Del {
            device: attrs
                .get("device")
                .cloned()
                .ok_or_else(|| Error::ParseError("delProperty missing @device".to_string()))?,
            name: attrs.get("name").cloned(),
        });
    }
    if tag == "message" {
        let attrs = root_attrs(&xml)?;
        return Ok(Frame::Message {
            device: attrs.get("device").cloned(),
            message: attrs.get("message").cloned(),
            timestamp: attrs.get("timestamp").cloned(),
        });
    }
    if tag.starts_with("def") {
        return Ok(Frame::Def {
            tag: tag.to_string(),
            xml,
        });
    }
    if tag.starts_with("set") {
        return Ok(Frame::Set {
            tag: tag.to_string(),
            xml,
        });
    }
    if tag.starts_with("new") {
        return Ok(Frame::New {
            tag: tag.to_string(),
            xml,
        });
    }
    Err(Error::ParseError(format!("unrecognized top-level tag: {tag}")))
}

fn root_attrs(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader
            .read_event()
            .map_err(|e| Error::ParseError(e.to_string()))?
        {
            Event::Start(e) | Event::Empty(e) => {
                let mut attrs = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(Error::from)?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .decode_and_unescape_value(reader.decoder())
                        .map_err(|e| Error::ParseError(e.to_string()))?
                        .into_owned();
                    attrs.insert(key, value);
                }
                return Ok(attrs);
            }
            Event::Eof => return Ok(HashMap::new()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_whole_frame() {
        let mut framer = XmlFramer::new();
        let frames = framer
            .feed(br#"<defNumberVector device="CCD" name="EXPOSURE"><defNumber name="V">1</defNumber></defNumberVector>"#)
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Def { tag, .. } if tag == "defNumberVector"));
        assert_eq!(framer.pending_bytes(), 0);
    }

    #[test]
    fn reassembles_a_frame_split_across_feeds() {
        let mut framer = XmlFramer::new();
        let whole = br#"<setSwitchVector device="Dome" name="DOME_MOTION"><oneSwitch name="CW">On</oneSwitch></setSwitchVector>"#;
        let (first, second) = whole.split_at(30);

        assert!(framer.feed(first).unwrap().is_empty());
        assert!(framer.pending_bytes() > 0);

        let frames = framer.feed(second).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Set { tag, .. } if tag == "setSwitchVector"));
    }

    #[test]
    fn parses_consecutive_frames_in_one_feed() {
        let mut framer = XmlFramer::new();
        let frames = framer
            .feed(br#"<delProperty device="Dome" name="DOME_MOTION"/><message device="Dome" message="parked" timestamp="2024-01-01T00:00:00"/>"#)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0],
            Frame::Del {
                device: "Dome".to_string(),
                name: Some("DOME_MOTION".to_string()),
            }
        );
        assert_eq!(
            frames[1],
            Frame::Message {
                device: Some("Dome".to_string()),
                message: Some("parked".to_string()),
                timestamp: Some("2024-01-01T00:00:00".to_string()),
            }
        );
    }

    #[test]
    fn ignores_getproperties_and_unknown_tags() {
        let mut framer = XmlFramer::new();
        let frames = framer
            .feed(br#"<getProperties version="1.7"/><defTextVector device="CCD" name="T"><defText name="A">hi</defText></defTextVector>"#)
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Def { tag, .. } if tag == "defTextVector"));
    }
}
