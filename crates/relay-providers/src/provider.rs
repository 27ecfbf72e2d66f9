//! Provider facade: one enum variant per vendor, selected by [`ProviderKind`].

use crate::adapter::{CallContext, VendorAdapter};
use crate::baidu::BaiduProvider;
use crate::palm::PalmProvider;
use crate::zhipu::ZhipuProvider;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use relay_core::{
    ChatRequest, ChatResponse, ChatStream, ProviderKind, RelayError, TransportResponse,
};
use tracing::{debug, error, warn};

/// A configured vendor provider
#[derive(Debug)]
pub enum Provider {
    /// Baidu ERNIE
    Baidu(BaiduProvider),
    /// Zhipu ChatGLM
    Zhipu(ZhipuProvider),
    /// Google PaLM
    Palm(PalmProvider),
}

impl Provider {
    /// Vendor family
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Baidu(_) => ProviderKind::Baidu,
            Self::Zhipu(_) => ProviderKind::Zhipu,
            Self::Palm(_) => ProviderKind::Palm,
        }
    }

    /// Provider instance id
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Baidu(p) => p.id(),
            Self::Zhipu(p) => p.id(),
            Self::Palm(p) => p.id(),
        }
    }

    /// Execute a non-streaming chat completion
    ///
    /// # Errors
    /// Validation, credential, transport, upstream or translation failures
    pub async fn chat_completion(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<ChatResponse, RelayError> {
        match self {
            Self::Baidu(p) => complete(p, request, ctx).await,
            Self::Zhipu(p) => complete(p, request, ctx).await,
            Self::Palm(p) => complete(p, request, ctx).await,
        }
    }

    /// Execute a streaming chat completion.
    ///
    /// A non-2xx upstream status, or a vendor that answers with a JSON error
    /// envelope instead of an event stream, is returned as an error before
    /// any frame is produced.
    ///
    /// # Errors
    /// Validation, credential, transport or upstream failures
    pub async fn chat_completion_stream(
        &self,
        request: &ChatRequest,
        ctx: &CallContext,
    ) -> Result<ChatStream, RelayError> {
        match self {
            Self::Baidu(p) => complete_stream(p, request, ctx).await,
            Self::Zhipu(p) => complete_stream(p, request, ctx).await,
            Self::Palm(p) => complete_stream(p, request, ctx).await,
        }
    }
}

impl From<BaiduProvider> for Provider {
    fn from(provider: BaiduProvider) -> Self {
        Self::Baidu(provider)
    }
}

impl From<ZhipuProvider> for Provider {
    fn from(provider: ZhipuProvider) -> Self {
        Self::Zhipu(provider)
    }
}

impl From<PalmProvider> for Provider {
    fn from(provider: PalmProvider) -> Self {
        Self::Palm(provider)
    }
}

async fn complete<A: VendorAdapter>(
    adapter: &A,
    request: &ChatRequest,
    ctx: &CallContext,
) -> Result<ChatResponse, RelayError> {
    request.validate()?;
    let call = adapter.build_request(request, ctx, false).await?;

    debug!(
        provider = %adapter.kind(),
        id = adapter.id(),
        model = %request.model,
        "Sending chat completion request"
    );

    let response = adapter.transport().execute(call).await?;
    let status = response.status;
    let success = response.is_success();
    let body = response.bytes().await?;

    if !success {
        let err = adapter.translate_error(status, &body);
        warn!(provider = %adapter.kind(), status, error = %err, "Upstream returned an error");
        return Err(err);
    }

    adapter
        .translate_response(status, &body, request, ctx)
        .map_err(|e| {
            if matches!(e, RelayError::Translation { .. }) {
                error!(provider = %adapter.kind(), error = %e, "Undecodable vendor response");
            }
            e
        })
}

async fn complete_stream<A: VendorAdapter>(
    adapter: &A,
    request: &ChatRequest,
    ctx: &CallContext,
) -> Result<ChatStream, RelayError> {
    request.validate()?;
    let call = adapter.build_request(request, ctx, true).await?;

    debug!(
        provider = %adapter.kind(),
        id = adapter.id(),
        model = %request.model,
        "Sending streaming chat completion request"
    );

    let response = adapter.transport().execute(call).await?;
    if !response.is_success() {
        let status = response.status;
        let body = response.bytes().await?;
        let err = adapter.translate_error(status, &body);
        warn!(provider = %adapter.kind(), status, error = %err, "Upstream returned an error");
        return Err(err);
    }

    let response = if adapter.kind().streams_natively() {
        match sniff_stream_body(response).await? {
            StreamBody::Sse(response) => response,
            StreamBody::Json { status, body } => {
                let err = adapter.translate_error(status, &body);
                warn!(
                    provider = %adapter.kind(),
                    status,
                    error = %err,
                    "Upstream answered a stream request with a JSON body"
                );
                return Err(err);
            }
        }
    } else {
        response
    };

    Ok(adapter.translate_stream(response, request, ctx))
}

/// Body of a 2xx answer to a streaming request
enum StreamBody {
    /// Event stream, with any bytes read so far put back in front
    Sse(TransportResponse),
    /// Whole JSON document; vendors send their error envelope this way
    Json { status: u16, body: Bytes },
}

/// Reads up to the first non-whitespace byte. A body opening with `{` is a
/// plain JSON envelope and is read to the end.
async fn sniff_stream_body(response: TransportResponse) -> Result<StreamBody, RelayError> {
    let TransportResponse { status, mut body } = response;
    let mut head = BytesMut::new();

    while let Some(chunk) = body.next().await {
        head.extend_from_slice(&chunk?);
        match head.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => {
                while let Some(chunk) = body.next().await {
                    head.extend_from_slice(&chunk?);
                }
                return Ok(StreamBody::Json {
                    status,
                    body: head.freeze(),
                });
            }
            Some(_) => break,
            None => {}
        }
    }

    let head = head.freeze();
    Ok(StreamBody::Sse(TransportResponse {
        status,
        body: stream::once(async move { Ok(head) }).chain(body).boxed(),
    }))
}
