//! Response decoding and error envelope parsing.

use crate::constants::{X_AMZN_REQUEST_ID, X_AMZ_REQUEST_ID};
use crate::error::{ApiError, ErrorCode, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::de::DeserializeOwned;

/// Content types the decoder knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/xml` or `text/xml`.
    Xml,
    /// `application/json` or `application/x-amz-json-*`.
    Json,
    /// Anything else, kept as bytes.
    Other,
}

impl ContentType {
    /// Classify a `content-type` header value, parameters are ignored.
    pub fn parse(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/xml" | "text/xml" => ContentType::Xml,
            "application/json" => ContentType::Json,
            v if v.starts_with("application/x-amz-json") => ContentType::Json,
            _ => ContentType::Other,
        }
    }
}

/// A parsed XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name, namespace prefix stripped.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content of this element.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a whole document and return its root element.
    pub fn parse(input: &[u8]) -> Result<XmlNode> {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => stack.push(XmlNode::from_start(e)?),
                Ok(Event::Empty(ref e)) => {
                    let node = XmlNode::from_start(e)?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::End(_)) => {
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, &mut root, node);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(node) = stack.last_mut() {
                        let text = e.unescape().map_err(malformed_xml)?;
                        node.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(malformed_xml(e)),
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ApiError::malformed_response(
                "xml document ended inside an element",
            ));
        }
        root.ok_or_else(|| ApiError::malformed_response("xml document has no root element"))
    }

    fn from_start(e: &BytesStart) -> Result<XmlNode> {
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(malformed_xml)?;
            let value = attr.unescape_value().map_err(malformed_xml)?;
            attributes.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }

        Ok(XmlNode {
            name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        })
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element named `name` in depth-first order, `self` included.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Text of the first direct child named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => {}
    }
}

fn malformed_xml(e: impl Into<anyhow::Error>) -> ApiError {
    ApiError::malformed_response("failed to parse xml response").with_source(e)
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// XML document.
    Xml(XmlNode),
    /// JSON document.
    Json(serde_json::Value),
    /// Body of a content type the decoder does not parse.
    Raw {
        /// The declared content type, empty when absent.
        content_type: String,
        /// Body bytes.
        bytes: Bytes,
    },
    /// No body.
    Empty,
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// HTTP status, always 2xx.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body bytes as received.
    pub raw: Bytes,
    /// Parsed body.
    pub body: Body,
}

impl Decoded {
    /// Request id reported by the service, if any.
    pub fn request_id(&self) -> Option<String> {
        request_id(&self.headers).or_else(|| match &self.body {
            Body::Xml(node) => node.find("RequestId").map(|n| n.text.clone()),
            _ => None,
        })
    }

    /// Deserialize the body as XML into `T`.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T> {
        let body = std::str::from_utf8(&self.raw).map_err(|e| {
            ApiError::malformed_response("response body is not valid utf-8").with_source(e)
        })?;
        quick_xml::de::from_str(body).map_err(|e| {
            ApiError::malformed_response("failed to deserialize xml response").with_source(e)
        })
    }

    /// Deserialize the body as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.raw).map_err(|e| {
            ApiError::malformed_response("failed to deserialize json response").with_source(e)
        })
    }
}

/// Turns raw responses into [`Decoded`] values or typed errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDecoder;

impl ResponseDecoder {
    /// Decode `resp`.
    ///
    /// Non-success statuses become an [`ApiError`] carrying the service code,
    /// message and request id parsed from the error envelope.
    pub fn decode(&self, resp: http::Response<Bytes>) -> Result<Decoded> {
        let (parts, raw) = resp.into_parts();
        let status = parts.status;
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !status.is_success() {
            return Err(decode_error(status, &parts.headers, &content_type, &raw));
        }

        let body = if raw.is_empty() {
            Body::Empty
        } else {
            match ContentType::parse(&content_type) {
                ContentType::Xml => Body::Xml(XmlNode::parse(&raw)?),
                ContentType::Json => Body::Json(serde_json::from_slice(&raw).map_err(|e| {
                    ApiError::malformed_response("failed to parse json response").with_source(e)
                })?),
                ContentType::Other => Body::Raw {
                    content_type,
                    bytes: raw.clone(),
                },
            }
        };

        Ok(Decoded {
            status,
            headers: parts.headers,
            raw,
            body,
        })
    }
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_AMZ_REQUEST_ID)
        .or_else(|| headers.get(X_AMZN_REQUEST_ID))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Build the error for a non-success response.
///
/// Bodies that cannot be parsed fall back to a code derived from the status.
fn decode_error(status: StatusCode, headers: &HeaderMap, content_type: &str, raw: &Bytes) -> ApiError {
    let mut request_id = request_id(headers);

    let kind = match ContentType::parse(content_type) {
        ContentType::Other => match raw.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => ContentType::Xml,
            Some(b'{') => ContentType::Json,
            _ => ContentType::Other,
        },
        v => v,
    };

    let envelope = match kind {
        ContentType::Xml => XmlNode::parse(raw).ok().and_then(|root| {
            if request_id.is_none() {
                request_id = root.find("RequestId").map(|n| n.text.clone());
            }
            let error = root.find("Error")?;
            let code = error.child_text("Code")?.to_string();
            let message = error.child_text("Message").unwrap_or_default().to_string();
            Some((code, message))
        }),
        ContentType::Json => serde_json::from_slice::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| {
                let code = headers
                    .get("x-amzn-errortype")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
                    .or_else(|| {
                        ["__type", "code", "Code"]
                            .iter()
                            .find_map(|k| v.get(*k)?.as_str().map(|s| s.to_string()))
                    })?;
                let message = ["message", "Message"]
                    .iter()
                    .find_map(|k| v.get(*k)?.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some((code, message))
            }),
        ContentType::Other => None,
    };

    let (code, message) = match envelope {
        Some((code, message)) => (ErrorCode::parse(&code), message),
        None => {
            debug!("no error envelope in response with status {status}");
            (
                ErrorCode::from_status(status),
                status.canonical_reason().unwrap_or_default().to_string(),
            )
        }
    };

    ApiError::from_service(status, code, message, request_id)
}
