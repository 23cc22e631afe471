// XML-RPC codec
// Request encoding and response decoding for the subset supervisord speaks

use std::collections::BTreeMap;
use std::iter::Peekable;

use multivisor_core::port::RpcError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    /// `dateTime.iso8601`, kept verbatim
    DateTime(String),
    /// `base64`, kept verbatim
    Base64(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }

    /// Protocol error naming the expected type
    pub fn unexpected(&self, expected: &str, context: &str) -> RpcError {
        RpcError::Protocol(format!(
            "{}: expected {}, got {}",
            context,
            expected,
            self.type_name()
        ))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a `methodCall` document
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
        Value::DateTime(s) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</dateTime.iso8601>");
        }
        Value::Base64(s) => {
            out.push_str("<base64>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
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
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

fn protocol(msg: impl Into<String>) -> RpcError {
    RpcError::Protocol(msg.into())
}

/// Flatten the document into open/close/text tokens; `<x/>` becomes open+close.
///
/// Text is kept verbatim, adjacent text and CDATA runs are merged. Whether
/// whitespace is layout or content is decided by the parser.
fn tokenize(xml: &str) -> Result<Vec<Token>, RpcError> {
    fn push_text(tokens: &mut Vec<Token>, text: &str) {
        match tokens.last_mut() {
            Some(Token::Text(previous)) => previous.push_str(text),
            _ => tokens.push(Token::Text(text.to_string())),
        }
    }

    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                tokens.push(Token::Open(String::from_utf8_lossy(e.name().as_ref()).into_owned()))
            }
            Ok(Event::End(e)) => {
                tokens.push(Token::Close(String::from_utf8_lossy(e.name().as_ref()).into_owned()))
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| protocol(e.to_string()))?;
                push_text(&mut tokens, &text);
            }
            Ok(Event::CData(c)) => push_text(&mut tokens, &String::from_utf8_lossy(&c.into_inner())),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(protocol(format!(
                    "malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Peekable<std::vec::IntoIter<Token>>,
}

fn is_blank(token: &Token) -> bool {
    matches!(token, Token::Text(text) if text.trim().is_empty())
}

impl Parser {
    /// Drop layout whitespace between elements
    fn skip_blank(&mut self) {
        while self.tokens.next_if(is_blank).is_some() {}
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_blank();
        self.tokens.peek()
    }

    fn next(&mut self) -> Option<Token> {
        self.skip_blank();
        self.tokens.next()
    }

    /// Raw text at the cursor, whitespace included
    fn take_text(&mut self) -> String {
        match self.tokens.next_if(|t| matches!(t, Token::Text(_))) {
            Some(Token::Text(text)) => text,
            _ => String::new(),
        }
    }

    fn peek_is_open(&mut self, tag: &str) -> bool {
        matches!(self.peek(), Some(Token::Open(name)) if name == tag)
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), RpcError> {
        match self.next() {
            Some(Token::Open(name)) if name == tag => Ok(()),
            other => Err(protocol(format!("expected <{}>, found {:?}", tag, other))),
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), RpcError> {
        match self.next() {
            Some(Token::Close(name)) if name == tag => Ok(()),
            other => Err(protocol(format!("expected </{}>, found {:?}", tag, other))),
        }
    }

    /// Optional text followed by `</tag>`
    fn text_until_close(&mut self, tag: &str) -> Result<String, RpcError> {
        let text = self.take_text();
        self.expect_close(tag)?;
        Ok(text)
    }

    fn parse_value(&mut self) -> Result<Value, RpcError> {
        self.expect_open("value")?;
        let leading = self.take_text();
        let tag = match self.tokens.next_if(|t| matches!(t, Token::Open(_))) {
            Some(Token::Open(tag)) if leading.trim().is_empty() => tag,
            Some(Token::Open(tag)) => {
                return Err(protocol(format!("unexpected text before <{}>", tag)))
            }
            // untyped value defaults to string
            _ => {
                self.expect_close("value")?;
                return Ok(Value::String(leading));
            }
        };

        let value = match tag.as_str() {
            "int" | "i4" | "i8" => {
                let text = self.text_until_close(&tag)?;
                Value::Int(
                    text.trim()
                        .parse()
                        .map_err(|_| protocol(format!("invalid integer '{}'", text)))?,
                )
            }
            "boolean" => match self.text_until_close(&tag)?.trim() {
                "1" => Value::Bool(true),
                "0" => Value::Bool(false),
                other => return Err(protocol(format!("invalid boolean '{}'", other))),
            },
            "double" => {
                let text = self.text_until_close(&tag)?;
                Value::Double(
                    text.trim()
                        .parse()
                        .map_err(|_| protocol(format!("invalid double '{}'", text)))?,
                )
            }
            "string" => Value::String(self.text_until_close(&tag)?),
            "dateTime.iso8601" => Value::DateTime(self.text_until_close(&tag)?),
            "base64" => Value::Base64(self.text_until_close(&tag)?),
            "nil" => {
                self.expect_close(&tag)?;
                Value::Nil
            }
            "array" => {
                self.expect_open("data")?;
                let mut items = Vec::new();
                while self.peek_is_open("value") {
                    items.push(self.parse_value()?);
                }
                self.expect_close("data")?;
                self.expect_close("array")?;
                Value::Array(items)
            }
            "struct" => {
                let mut members = BTreeMap::new();
                while self.peek_is_open("member") {
                    self.next();
                    self.expect_open("name")?;
                    let name = self.text_until_close("name")?;
                    let member = self.parse_value()?;
                    self.expect_close("member")?;
                    members.insert(name, member);
                }
                self.expect_close("struct")?;
                Value::Struct(members)
            }
            other => return Err(protocol(format!("unsupported value type <{}>", other))),
        };
        self.expect_close("value")?;
        Ok(value)
    }
}

/// Decode a `methodResponse` document
///
/// # Errors
/// - RpcError::Fault for a `<fault>` response
/// - RpcError::Protocol for anything that is not a well-formed response
pub fn decode_response(xml: &str) -> Result<Value, RpcError> {
    let mut parser = Parser {
        tokens: tokenize(xml)?.into_iter().peekable(),
    };
    parser.expect_open("methodResponse")?;

    let result = if parser.peek_is_open("fault") {
        parser.next();
        let fault = parser.parse_value()?;
        parser.expect_close("fault")?;
        Err(fault_from(&fault)?)
    } else {
        parser.expect_open("params")?;
        parser.expect_open("param")?;
        let value = parser.parse_value()?;
        parser.expect_close("param")?;
        parser.expect_close("params")?;
        Ok(value)
    };

    parser.expect_close("methodResponse")?;
    result
}

fn fault_from(value: &Value) -> Result<RpcError, RpcError> {
    let members = value
        .as_struct()
        .ok_or_else(|| value.unexpected("struct", "fault"))?;
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .ok_or_else(|| protocol("fault without integer faultCode"))?;
    let message = members
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(RpcError::Fault { code, message })
}
