//! Model stream sources and the Gemini client.
//!
//! [`ModelStreamSource`] is the seam between the turn protocol and whatever
//! produces model text: the protocol asks for one reply and consumes it as
//! a stream of pieces in arrival order.  [`Gemini`] is the production
//! source, speaking the `streamGenerateContent` REST endpoint over SSE.
//! Tests substitute scripted sources.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::{Deserialize, Serialize};
use std::env;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Message, Role};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A stream of reply pieces in backend arrival order.
///
/// Pieces come in whatever sizes the backend chooses; consumers must not
/// assume any alignment with lines, words, or fence markers.
pub type PieceStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Generation parameters forwarded with one reply request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature, if the caller set one.
    pub temperature: Option<f32>,

    /// Cap on generated tokens, if the caller set one.
    pub max_output_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Create options with every parameter left to the backend default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generated-token cap.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// A backend that turns a conversation into a streamed reply.
///
/// Implementations start one generation per call and hand back the pieces
/// as they arrive.  Dropping the returned stream abandons the reply; no
/// further pieces are pulled from the backend.
#[async_trait]
pub trait ModelStreamSource: Send + Sync {
    /// Start one reply for the given conversation.
    ///
    /// The history must be in arrival order with the newest user message
    /// last.  Errors returned here mean the reply never started; errors
    /// yielded by the stream mean it failed mid-flight.
    async fn stream_reply(
        &self,
        history: Vec<Message>,
        options: GenerationOptions,
    ) -> Result<PieceStream>;
}

/// Client for the Gemini API.
#[derive(Debug, Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    model: String,
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from the
    /// GEMINUS_API_KEY environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// There is deliberately no overall request timeout: a reply streams
    /// for as long as the model generates.  Only the connect phase is
    /// bounded.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var("GEMINUS_API_KEY").map_err(|_| {
                Error::authentication(
                    "API key not provided and GEMINUS_API_KEY environment variable not set",
                )
            })?,
        };

        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).expect("API key should be valid"),
        );
        headers
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        // The body is usually {"error": {"code", "message", "status"}};
        // fall back to the raw text when it is not.
        let parsed = serde_json::from_str::<ErrorResponse>(&error_body).ok();
        let error_status = parsed
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .and_then(|e| e.status.clone());
        let error_message = parsed
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_status, error_message),
        }
    }
}

#[async_trait]
impl ModelStreamSource for Gemini {
    async fn stream_reply(
        &self,
        history: Vec<Message>,
        options: GenerationOptions,
    ) -> Result<PieceStream> {
        let url = format!(
            "{}models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&build_request(&history, options))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("Request timed out: {e}"))
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let stream = response.bytes_stream();

        Ok(Box::pin(process_sse(stream)))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Map a conversation onto the wire request.  Assistant turns take the
/// backend's "model" role.
fn build_request(history: &[Message], options: GenerationOptions) -> GenerateContentRequest {
    let contents = history
        .iter()
        .map(|message| Content {
            role: match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            },
            parts: vec![RequestPart {
                text: message.content.clone(),
            }],
        })
        .collect();

    let generation_config =
        if options.temperature.is_some() || options.max_output_tokens.is_some() {
            Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            })
        } else {
            None
        };

    GenerateContentRequest {
        contents,
        generation_config,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let mut text = String::new();
        for candidate in &self.candidates {
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(t) = &part.text {
                    text.push_str(t);
                }
            }
        }
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Process a stream of bytes into a stream of reply pieces.
///
/// Frames are delimited by a blank line, LF or CRLF flavored; the backend
/// emits CRLF.  Bytes accumulate until a delimiter arrives, so a UTF-8
/// character or a frame split across network chunks reassembles cleanly.
/// Frames that carry no text are skipped rather than surfaced as empty
/// pieces.
fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream
        .map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        })
        .fuse();

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First check if we have a complete frame in the buffer
                if let Some((item, remaining)) = extract_piece(&buffer) {
                    buffer = remaining;
                    match item {
                        Ok(Some(piece)) => return Some((Ok(piece), (stream, buffer))),
                        Ok(None) => continue,
                        Err(err) => return Some((Err(err), (stream, buffer))),
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer)));
                    }
                    None => {
                        // End of stream; a final frame may lack its
                        // trailing blank line.
                        if buffer.is_empty() {
                            return None;
                        }
                        let trailing = std::mem::take(&mut buffer);
                        let item = match std::str::from_utf8(&trailing) {
                            Ok(frame) => parse_frame(frame),
                            Err(e) => Err(e.into()),
                        };
                        match item {
                            Ok(Some(piece)) => return Some((Ok(piece), (stream, buffer))),
                            Ok(None) => return None,
                            Err(err) => return Some((Err(err), (stream, buffer))),
                        }
                    }
                }
            }
        },
    )
}

/// Extract a complete SSE frame from the buffer and parse it into a piece.
fn extract_piece(buffer: &[u8]) -> Option<(Result<Option<String>>, Vec<u8>)> {
    let (end, delimiter) = find_frame_boundary(buffer)?;
    let rest = buffer[end + delimiter..].to_vec();
    match std::str::from_utf8(&buffer[..end]) {
        Ok(frame) => Some((parse_frame(frame), rest)),
        Err(e) => Some((Err(e.into()), rest)),
    }
}

/// Find the earliest frame delimiter, returning the frame end and the
/// delimiter length.
fn find_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if lf.0 <= crlf.0 { lf } else { crlf }),
        (lf, crlf) => lf.or(crlf),
    }
}

/// Parse one frame's data into reply text.  `Ok(None)` means the frame
/// carried nothing worth forwarding.  Multiple `data:` lines in a frame
/// join with a newline, per text/event-stream framing; the backend sends
/// one line per frame.
fn parse_frame(frame: &str) -> Result<Option<String>> {
    let mut data: Option<String> = None;
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(rest);
                }
                None => data = Some(rest.to_string()),
            }
        }
    }

    let Some(data) = data else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let response = serde_json::from_str::<GenerateContentResponse>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse stream JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;

    if let Some(detail) = response.error {
        return Err(Error::api(
            detail.code.unwrap_or(500),
            detail.status,
            detail
                .message
                .unwrap_or_else(|| "stream error".to_string()),
        ));
    }

    Ok(response.text())
}
