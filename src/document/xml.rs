//! Small quick-xml helpers shared by the MSM, MPM and MEI code

use std::collections::BTreeMap;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::{EditorError, Result};

/// Collect the attributes of an element into a map keyed by qualified name.
pub(crate) fn attributes(element: &BytesStart) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

pub(crate) fn parse_f64(attrs: &BTreeMap<String, String>, key: &str) -> Option<f64> {
    attrs
        .get(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Dates are written as decimals by some producers (`date="720.0"`).
pub(crate) fn parse_ticks(attrs: &BTreeMap<String, String>, key: &str) -> Option<u64> {
    parse_f64(attrs, key)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64)
}

/// Strip the leading `#` of a URI reference (`#n12` -> `n12`).
pub(crate) fn strip_ref(reference: &str) -> &str {
    reference.trim().trim_start_matches('#')
}

/// Element writer with two-space indentation.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    pub(crate) fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<()> {
        self.writer.write_event(Event::Start(element(name, attrs)))?;
        Ok(())
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<()> {
        self.writer.write_event(Event::Empty(element(name, attrs)))?;
        Ok(())
    }

    pub(crate) fn close(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| EditorError::InvalidDocument(e.to_string()))
    }
}

fn element<'a>(name: &'a str, attrs: &[(&str, String)]) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    for (key, value) in attrs {
        element.push_attribute((*key, value.as_str()));
    }
    element
}
