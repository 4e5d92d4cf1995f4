//! Job and result records exchanged with callers
//!
//! Inbound jobs arrive as loose JSON so that a bad field can be told apart
//! from a missing one: a missing or non-string `html` rejects the job, while
//! an unusable `width`/`height` only drops the requested size.

use crate::rendering::Screenshot;
use crate::{Error, ErrorKind, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-requested output size. `None` on an axis means auto-size it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl SizeRequest {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn is_auto(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub html: String,
    pub size: SizeRequest,
}

/// A job accepted for rendering. `size_error` holds the recovered
/// `InvalidSize` problem, if any; the job's size is auto in that case.
#[derive(Debug)]
pub struct ParsedJob {
    pub job: RenderJob,
    pub size_error: Option<Error>,
}

impl RenderJob {
    pub fn new(html: impl Into<String>, size: SizeRequest) -> Self {
        Self { html: html.into(), size }
    }

    /// Validate an inbound record. Fails only for `InvalidJob`. Range checks
    /// against the service limits happen later, when the size is resolved.
    pub fn from_message(message: &Value) -> Result<ParsedJob> {
        let fields = message
            .as_object()
            .ok_or_else(|| Error::InvalidJob(format!("expected a JSON object, got {}", type_name(message))))?;

        let html = match fields.get("html") {
            Some(Value::String(html)) => html.clone(),
            Some(other) => {
                return Err(Error::InvalidJob(format!("`html` must be a string, got {}", type_name(other))));
            }
            None => return Err(Error::InvalidJob("missing `html` field".into())),
        };

        let width = parse_dimension(fields.get("width"));
        let height = parse_dimension(fields.get("height"));
        let (size, size_error) = match (width, height) {
            (Ok(width), Ok(height)) => (SizeRequest { width, height }, None),
            (w, h) => {
                let problems = [("width", w.err()), ("height", h.err())]
                    .into_iter()
                    .filter_map(|(field, err)| err.map(|e| format!("`{}` {}", field, e)))
                    .collect::<Vec<_>>()
                    .join(", ");
                (SizeRequest::auto(), Some(Error::InvalidSize(problems)))
            }
        };

        Ok(ParsedJob { job: RenderJob { html, size }, size_error })
    }
}

/// `Ok(None)` for absent, null or zero; `Err` describes an unusable value.
/// Integers beyond `u32` saturate so they still fail the size limit.
fn parse_dimension(value: Option<&Value>) -> std::result::Result<Option<u32>, String> {
    let n = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => v,
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => f as u64,
            _ => return Err(format!("is not a non-negative integer: {}", n)),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("is not a non-negative integer: {:?}", s))?,
        Some(other) => return Err(format!("must be an integer, got {}", type_name(other))),
    };
    Ok(if n == 0 { None } else { Some(u32::try_from(n).unwrap_or(u32::MAX)) })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Successful render: PNG bytes, standard base64, unwrapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub image: String,
}

impl RenderResult {
    pub fn from_screenshot(shot: &Screenshot) -> Self {
        Self { image: shot.to_base64() }
    }

    /// Decode the PNG bytes carried by `image`
    pub fn png_bytes(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
}

/// Error-shaped reply; carries no `image`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFailure {
    pub error: FailureDetail,
}

/// One record per completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Image(RenderResult),
    Failure(RenderFailure),
}

impl Outbound {
    pub fn failure(err: &Error) -> Self {
        Outbound::Failure(RenderFailure {
            error: FailureDetail { kind: err.kind(), message: err.to_string() },
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outbound::Image(_))
    }
}
