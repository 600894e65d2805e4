use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("unexpected xml-rpc structure: {0}")]
    Structure(String),
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
}

pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(flag) => {
            out.push_str("<boolean>");
            out.push_str(if *flag { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                out.push_str(&format!("<int>{int}</int>"));
            } else {
                out.push_str(&format!("<double>{number}</double>"));
            }
        }
        Value::String(text) => {
            out.push_str("<string>");
            out.push_str(&escape(text.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

fn tokenize(xml: &str) -> Result<Vec<Token>, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(tag) => tokens.push(Token::Open(tag_name(tag.name().as_ref()))),
            Event::End(tag) => tokens.push(Token::Close(tag_name(tag.name().as_ref()))),
            Event::Empty(tag) => {
                let name = tag_name(tag.name().as_ref());
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Event::Text(text) => tokens.push(Token::Text(text.unescape()?.into_owned())),
            Event::CData(data) => tokens.push(Token::Text(
                String::from_utf8_lossy(&data.into_inner()).into_owned(),
            )),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn skip_blank(&mut self) {
        while let Some(Token::Text(text)) = self.tokens.get(self.pos) {
            if !text.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_blank();
        self.tokens.get(self.pos)
    }

    fn expect_open(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.peek().cloned() {
            Some(Token::Open(found)) if found == name => {
                self.pos += 1;
                Ok(())
            }
            other => Err(structure(format!("expected <{name}>, found {other:?}"))),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.peek().cloned() {
            Some(Token::Close(found)) if found == name => {
                self.pos += 1;
                Ok(())
            }
            other => Err(structure(format!("expected </{name}>, found {other:?}"))),
        }
    }

    // Scalar content keeps its whitespace untouched.
    fn text_until_close(&mut self, name: &str) -> Result<String, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.tokens.get(self.pos) {
                Some(Token::Text(chunk)) => {
                    text.push_str(chunk);
                    self.pos += 1;
                }
                Some(Token::Close(found)) if found == name => {
                    self.pos += 1;
                    return Ok(text);
                }
                other => {
                    return Err(structure(format!(
                        "expected text inside <{name}>, found {other:?}"
                    )))
                }
            }
        }
    }

    fn value(&mut self) -> Result<Value, XmlRpcError> {
        self.expect_open("value")?;

        // An untyped <value> holds a bare string.
        let start = self.pos;
        let mut bare = String::new();
        while let Some(Token::Text(chunk)) = self.tokens.get(self.pos) {
            bare.push_str(chunk);
            self.pos += 1;
        }
        if let Some(Token::Close(found)) = self.tokens.get(self.pos) {
            if found == "value" {
                self.pos += 1;
                return Ok(Value::String(bare));
            }
        }
        self.pos = start;

        let tag = match self.peek().cloned() {
            Some(Token::Open(tag)) => tag,
            other => return Err(structure(format!("expected typed value, found {other:?}"))),
        };
        self.pos += 1;

        let value = match tag.as_str() {
            "string" | "dateTime.iso8601" | "base64" => Value::String(self.text_until_close(&tag)?),
            "int" | "i4" | "i8" => {
                let raw = self.text_until_close(&tag)?;
                let int = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|err| structure(format!("bad integer {raw:?}: {err}")))?;
                Value::Number(int.into())
            }
            "boolean" => {
                let raw = self.text_until_close(&tag)?;
                match raw.trim() {
                    "1" => Value::Bool(true),
                    "0" => Value::Bool(false),
                    other => return Err(structure(format!("bad boolean {other:?}"))),
                }
            }
            "double" => {
                let raw = self.text_until_close(&tag)?;
                let float = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|err| structure(format!("bad double {raw:?}: {err}")))?;
                Number::from_f64(float).map(Value::Number).unwrap_or(Value::Null)
            }
            "nil" => {
                self.expect_close("nil")?;
                Value::Null
            }
            "array" => {
                self.expect_open("data")?;
                let mut items = Vec::new();
                while matches!(self.peek(), Some(Token::Open(name)) if name == "value") {
                    items.push(self.value()?);
                }
                self.expect_close("data")?;
                self.expect_close("array")?;
                Value::Array(items)
            }
            "struct" => {
                let mut members = Map::new();
                while matches!(self.peek(), Some(Token::Open(name)) if name == "member") {
                    self.pos += 1;
                    self.expect_open("name")?;
                    let name = self.text_until_close("name")?;
                    let member = self.value()?;
                    self.expect_close("member")?;
                    members.insert(name, member);
                }
                self.expect_close("struct")?;
                Value::Object(members)
            }
            other => return Err(structure(format!("unsupported value type <{other}>"))),
        };

        self.expect_close("value")?;
        Ok(value)
    }
}

fn structure(detail: String) -> XmlRpcError {
    XmlRpcError::Structure(detail)
}

/// Decodes a `methodResponse` into its single return value, or the remote fault.
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let mut cursor = Cursor {
        tokens: tokenize(xml)?,
        pos: 0,
    };
    cursor.expect_open("methodResponse")?;

    match cursor.peek().cloned() {
        Some(Token::Open(tag)) if tag == "params" => {
            cursor.pos += 1;
            cursor.expect_open("param")?;
            let value = cursor.value()?;
            cursor.expect_close("param")?;
            cursor.expect_close("params")?;
            Ok(value)
        }
        Some(Token::Open(tag)) if tag == "fault" => {
            cursor.pos += 1;
            let fault = cursor.value()?;
            let code = fault.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
            let message = fault
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or("unknown fault")
                .to_string();
            Err(XmlRpcError::Fault { code, message })
        }
        other => Err(structure(format!(
            "expected <params> or <fault>, found {other:?}"
        ))),
    }
}
