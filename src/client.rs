use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::accumulating_stream::FragmentDecoder;
use crate::error::{Error, Result};
use crate::llm_config::LlmConfig;
use crate::observability::{
    CLIENT_BUILD_ERRORS, CLIENT_BUILDS, STREAM_ERRORS, STREAM_FRAGMENTS, STREAM_OPEN_ERRORS,
    STREAM_TTFF,
};
use crate::profile::ProfileConfig;
use crate::sse::{ChatStreamEvent, process_sse};
use crate::tools::ToolConfig;
use crate::types::{ChatCompletionRequest, Message};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A lazy, single-pass sequence of response fragments.
///
/// An `Err` item means the response was cut short; it is always the last item.
pub type FragmentStream<'a> = BoxStream<'a, Result<String>>;

/// A client bound to one model configuration.
///
/// Transport and parse problems are logged and reported as a final `Err`
/// item.  A sequence that ends without one is a complete response, possibly
/// empty.
pub trait ChatBackend: Send + Sync {
    /// The model this client talks to.
    fn model(&self) -> &str;

    /// Stream the response to `history`, which ends with the user's turn.
    fn stream<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a>;
}

/// Builds clients from profile settings.
pub trait ClientFactory {
    /// Build a client for `config`, carrying `tools`.
    ///
    /// Fails with a configuration error when the profile cannot name a model.
    fn build(&self, config: &ProfileConfig, tools: &ToolConfig) -> Result<Box<dyn ChatBackend>>;
}

//////////////////////////////////////////// LlmClient ////////////////////////////////////////////

/// Client for an OpenAI-compatible chat completions server.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmConfig,
    tools: ToolConfig,
    client: ReqwestClient,
    endpoint: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl LlmClient {
    /// Create a new client for `config`.
    pub fn new(config: LlmConfig, tools: ToolConfig) -> Result<Self> {
        Self::with_timeout(config, tools, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with a custom connect timeout.
    ///
    /// Responses are streamed for as long as the model generates, so only
    /// connection establishment is bounded.
    pub fn with_timeout(config: LlmConfig, tools: ToolConfig, timeout: Duration) -> Result<Self> {
        let endpoint = chat_endpoint(&config.model_server)?;
        let headers = default_headers(&config.api_key)?;
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            config,
            tools,
            client,
            endpoint,
            headers,
            timeout,
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// The tool servers this client carries.
    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    /// The chat completions URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // OpenAI-compatible servers wrap errors as {"error": {...}}
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 | 403 => Error::authentication(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Send the conversation and get a stream of server-sent events.
    pub async fn open_stream(
        &self,
        history: &[Message],
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>> {
        let request = ChatCompletionRequest::new(
            &self.config.model,
            self.config.system.as_deref(),
            history,
            self.config.template.as_deref(),
            &self.config.options,
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        Ok(process_sse(response.bytes_stream()).boxed())
    }
}

impl ChatBackend for LlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    fn stream<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a> {
        let started = Instant::now();
        let opened = async move {
            match self.open_stream(history).await {
                Ok(events) => fragments(events, started),
                Err(err) => {
                    STREAM_OPEN_ERRORS.click();
                    tracing::warn!(model = %self.config.model, "cannot open response stream: {err}");
                    stream::iter([Err(err)]).boxed()
                }
            }
        };
        stream::once(opened).flatten().boxed()
    }
}

struct FragmentState<'a> {
    events: BoxStream<'a, Result<ChatStreamEvent>>,
    decoder: FragmentDecoder,
    started: Instant,
    first: bool,
    finished: bool,
}

/// Decode chunk events into fragments, ending after the first error.
fn fragments(events: BoxStream<'_, Result<ChatStreamEvent>>, started: Instant) -> FragmentStream<'_> {
    let state = FragmentState {
        events,
        decoder: FragmentDecoder::new(),
        started,
        first: true,
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.events.next().await? {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    if let Some(fragment) = state.decoder.push_chunk(&chunk) {
                        if state.first {
                            STREAM_TTFF.add(state.started.elapsed().as_secs_f64());
                            state.first = false;
                        }
                        STREAM_FRAGMENTS.click();
                        return Some((Ok(fragment), state));
                    }
                }
                Ok(ChatStreamEvent::Done) => return None,
                Err(err) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(
                        received = state.decoder.received().len(),
                        "response stream ended early: {err}"
                    );
                    state.finished = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}

/// Resolve `{model_server}/chat/completions`.
fn chat_endpoint(model_server: &str) -> Result<Url> {
    let invalid = |reason: String| {
        Error::configuration(
            format!("invalid model server {model_server:?}: {reason}"),
            Some("model_server".to_string()),
        )
    };
    let mut base = Url::parse(model_server).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(invalid("expected an http(s) URL".to_string()));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("chat/completions")
        .map_err(|e| invalid(e.to_string()))
}

/// Create and return default headers for API requests.
fn default_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
    let bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
        Error::configuration(
            "api key contains characters not allowed in a header",
            Some("api_key".to_string()),
        )
    })?;
    headers.insert(header::AUTHORIZATION, bearer);
    Ok(headers)
}

///////////////////////////////////////// HttpClientFactory ////////////////////////////////////////

/// Builds [`LlmClient`]s from coder profiles.
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    timeout: Option<Duration>,
}

impl HttpClientFactory {
    /// Create a factory using the default connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory whose clients use `timeout` to connect.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, config: &ProfileConfig, tools: &ToolConfig) -> Result<Box<dyn ChatBackend>> {
        let built = LlmConfig::from_profile(config).and_then(|llm| {
            LlmClient::with_timeout(
                llm,
                tools.clone(),
                self.timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            )
        });
        match built {
            Ok(client) => {
                CLIENT_BUILDS.click();
                tracing::debug!(
                    model = %client.config.model,
                    endpoint = %client.endpoint,
                    tools = client.tools.servers().len(),
                    "built chat client"
                );
                Ok(Box::new(client))
            }
            Err(err) => {
                CLIENT_BUILD_ERRORS.click();
                tracing::error!("cannot build chat client: {err}");
                Err(err)
            }
        }
    }
}
