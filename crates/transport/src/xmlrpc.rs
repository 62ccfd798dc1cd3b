//! XML-RPC `<value>` documents. Task results are reported in this rendering
//! regardless of the envelope the call was made with.

use std::collections::BTreeMap;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::{format_datetime, parse_datetime, Value};

#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("unexpected end of document")]
    Eof,
    #[error("unexpected {0}")]
    Unexpected(String),
    #[error("invalid {kind} `{text}`")]
    Invalid { kind: &'static str, text: String },
}

/// Parses a single `<value>` element. Untyped values are strings.
pub fn parse_value(doc: &str) -> Result<Value, XmlRpcError> {
    let mut parser = Parser {
        reader: Reader::from_str(doc),
    };
    let value = match parser.tag()? {
        Tag::Start(name) if name == "value" => parser.value()?,
        Tag::Empty(name) if name == "value" => Value::String(String::new()),
        tag => return Err(tag.unexpected()),
    };
    parser.finish()?;
    Ok(value)
}

/// Renders `value` as a `<value>` element, strings are left untyped
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    render(&mut out, value);
    out
}

fn render(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(v) => out.push_str(&format!("<int>{v}</int>")),
        Value::Float(v) => out.push_str(&format!("<double>{v}</double>")),
        Value::Bool(v) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*v))),
        Value::String(v) => out.push_str(&escape(v.as_str())),
        Value::DateTime(v) => out.push_str(&format!(
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            format_datetime(v)
        )),
        Value::List(items) => {
            out.push_str("<array><data>");
            for item in items {
                render(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Map(members) => {
            out.push_str("<struct>");
            for (name, value) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                render(out, value);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

enum Tag {
    Start(String),
    Empty(String),
    End(String),
}

impl Tag {
    fn unexpected(self) -> XmlRpcError {
        XmlRpcError::Unexpected(match self {
            Self::Start(name) => format!("<{name}>"),
            Self::Empty(name) => format!("<{name}/>"),
            Self::End(name) => format!("</{name}>"),
        })
    }
}

fn name(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).into_owned()
}

fn unexpected(event: Event<'_>) -> XmlRpcError {
    match event {
        Event::Start(e) => Tag::Start(name(e.name())).unexpected(),
        Event::Empty(e) => Tag::Empty(name(e.name())).unexpected(),
        Event::End(e) => Tag::End(name(e.name())).unexpected(),
        Event::Text(t) => XmlRpcError::Unexpected(format!("text `{}`", String::from_utf8_lossy(&t))),
        event => XmlRpcError::Unexpected(format!("{event:?}")),
    }
}

fn invalid(kind: &'static str, text: &str) -> XmlRpcError {
    XmlRpcError::Invalid {
        kind,
        text: text.to_string(),
    }
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    /// Next event, skipping the prolog, comments and processing instructions
    fn event(&mut self) -> Result<Event<'a>, XmlRpcError> {
        loop {
            match self.reader.read_event()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => return Err(XmlRpcError::Eof),
                event => return Ok(event),
            }
        }
    }

    /// Next tag, skipping whitespace between elements
    fn tag(&mut self) -> Result<Tag, XmlRpcError> {
        loop {
            match self.event()? {
                Event::Start(e) => return Ok(Tag::Start(name(e.name()))),
                Event::Empty(e) => return Ok(Tag::Empty(name(e.name()))),
                Event::End(e) => return Ok(Tag::End(name(e.name()))),
                Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => {}
                event => return Err(unexpected(event)),
            }
        }
    }

    fn expect_end(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.tag()? {
            Tag::End(name) if name == tag => Ok(()),
            other => Err(other.unexpected()),
        }
    }

    /// Character data up to the closing `tag`
    fn text(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.event()? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::End(e) if e.name().as_ref() == tag.as_bytes() => return Ok(text),
                event => return Err(unexpected(event)),
            }
        }
    }

    /// Contents of a `<value>` element whose opening tag was consumed
    fn value(&mut self) -> Result<Value, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.event()? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::End(e) if e.name().as_ref() == b"value" => return Ok(Value::String(text)),
                Event::Start(e) if text.trim().is_empty() => {
                    let value = self.typed(&name(e.name()))?;
                    self.expect_end("value")?;
                    return Ok(value);
                }
                Event::Empty(e) if text.trim().is_empty() => {
                    let value = match name(e.name()).as_str() {
                        "string" | "base64" | "nil" => Value::String(String::new()),
                        "array" => Value::List(Vec::new()),
                        "struct" => Value::Map(BTreeMap::new()),
                        other => return Err(XmlRpcError::Unexpected(format!("<{other}/>"))),
                    };
                    self.expect_end("value")?;
                    return Ok(value);
                }
                event => return Err(unexpected(event)),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<Value, XmlRpcError> {
        match tag {
            "string" | "base64" => self.text(tag).map(Value::String),
            "int" | "i4" | "i8" => {
                let text = self.text(tag)?;
                text.trim()
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| invalid("int", &text))
            }
            "double" => {
                let text = self.text(tag)?;
                text.trim()
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| invalid("double", &text))
            }
            "boolean" => {
                let text = self.text(tag)?;
                match text.trim() {
                    "1" => Ok(Value::Bool(true)),
                    "0" => Ok(Value::Bool(false)),
                    _ => Err(invalid("boolean", &text)),
                }
            }
            "dateTime.iso8601" => {
                let text = self.text(tag)?;
                parse_datetime(text.trim())
                    .map(Value::DateTime)
                    .ok_or_else(|| invalid("dateTime.iso8601", &text))
            }
            "nil" => {
                self.expect_end(tag)?;
                Ok(Value::String(String::new()))
            }
            "array" => self.array(),
            "struct" => self.members(),
            other => Err(XmlRpcError::Unexpected(format!("<{other}>"))),
        }
    }

    fn array(&mut self) -> Result<Value, XmlRpcError> {
        let mut items = Vec::new();
        match self.tag()? {
            Tag::Start(name) if name == "data" => loop {
                match self.tag()? {
                    Tag::Start(name) if name == "value" => items.push(self.value()?),
                    Tag::Empty(name) if name == "value" => items.push(Value::String(String::new())),
                    Tag::End(name) if name == "data" => break,
                    tag => return Err(tag.unexpected()),
                }
            },
            Tag::Empty(name) if name == "data" => {}
            tag => return Err(tag.unexpected()),
        }
        self.expect_end("array")?;
        Ok(Value::List(items))
    }

    fn members(&mut self) -> Result<Value, XmlRpcError> {
        let mut members = BTreeMap::new();
        loop {
            match self.tag()? {
                Tag::Start(name) if name == "member" => {}
                Tag::End(name) if name == "struct" => return Ok(Value::Map(members)),
                tag => return Err(tag.unexpected()),
            }
            let key = match self.tag()? {
                Tag::Start(name) if name == "name" => self.text("name")?,
                Tag::Empty(name) if name == "name" => String::new(),
                tag => return Err(tag.unexpected()),
            };
            let value = match self.tag()? {
                Tag::Start(name) if name == "value" => self.value()?,
                Tag::Empty(name) if name == "value" => Value::String(String::new()),
                tag => return Err(tag.unexpected()),
            };
            self.expect_end("member")?;
            members.insert(key, value);
        }
    }

    /// Accepts trailing whitespace and comments only
    fn finish(&mut self) -> Result<(), XmlRpcError> {
        loop {
            match self.reader.read_event()? {
                Event::Eof => return Ok(()),
                Event::Comment(_) | Event::PI(_) => {}
                Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => {}
                event => return Err(unexpected(event)),
            }
        }
    }
}
