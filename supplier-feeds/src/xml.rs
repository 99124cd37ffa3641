use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(e: &BytesStart) -> Result<Self, anyhow::Error> {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let mut fields = Map::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            fields.insert(key, Value::String(attr.unescape_value()?.to_string()));
        }
        Ok(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn close(mut self) -> (String, Value) {
        let text = self.text.trim().to_string();
        let value = if self.fields.is_empty() {
            Value::String(text)
        } else {
            if !text.is_empty() {
                self.fields.insert("$text".to_string(), Value::String(text));
            }
            Value::Object(self.fields)
        };
        (self.name, value)
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.fields.entry(name).or_insert_with(|| Value::Array(vec![])) {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![other.take(), value]),
        }
    }
}

/// Converts an XML document into nested JSON.
///
/// Every child element becomes an array entry under its tag name, attributes
/// are stored under `@name`, and text under `$text` (or as a plain string when
/// the element has neither attributes nor children). The document element is
/// itself the single entry of the top level array named after it.
pub fn to_value(xml: &str) -> Result<Value, anyhow::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<Frame> = vec![Frame {
        name: String::new(),
        fields: Map::new(),
        text: String::new(),
    }];
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Frame::open(&e)?),
            Event::Empty(e) => {
                let (name, value) = Frame::open(&e)?.close();
                if let Some(parent) = stack.last_mut() {
                    parent.push_child(name, value);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(anyhow::anyhow!("Unbalanced closing tag"));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.close();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(name, value);
                    }
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }
    if stack.len() != 1 {
        return Err(anyhow::anyhow!("Unexpected end of document"));
    }
    let root = stack.pop().map(|f| f.fields).unwrap_or_default();
    Ok(Value::Object(root))
}
