//! In-process HTTP upstream for adapter-level streaming tests: a raw hyper
//! server serving canned byte strings, collapsed from a subprocess with
//! scenario/transport knobs down to one "always succeeds with one token"
//! responder embedded directly in the test binary, plus an Ollama NDJSON
//! branch for that adapter's line-delimited wire format.

use std::convert::Infallible;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

pub struct MockUpstream {
    pub base_url: String,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream local addr");
        let conn_builder = AutoBuilder::new(TokioExecutor::new());

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let io = TokioIo::new(stream);
                let conn_builder = conn_builder.clone();
                let service = service_fn(move |request: Request<Incoming>| async move {
                    Ok::<_, Infallible>(handle_request(request).await)
                });
                tokio::spawn(async move {
                    let _ = conn_builder.serve_connection(io, service).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
        }
    }
}

async fn handle_request(request: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    if !matches!(parts.method, Method::POST | Method::GET) {
        return simple(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }

    let path = parts.uri.path();
    match path {
        "/chat/completions" => simple(StatusCode::OK, "text/event-stream", OPENAI_CHAT_STREAM_TEXT),
        "/messages" => simple(StatusCode::OK, "text/event-stream", ANTHROPIC_STREAM_TEXT),
        "/api/chat" => simple(StatusCode::OK, "application/x-ndjson", OLLAMA_NDJSON_TEXT),
        _ if path.starts_with("/models/") && path.contains(":streamGenerateContent") => {
            simple(StatusCode::OK, "text/event-stream", GEMINI_STREAM_TEXT)
        }
        _ => simple(StatusCode::NOT_FOUND, "application/json", br#"{"error":"not_found"}"#),
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn simple(status: StatusCode, content_type: &'static str, body: &'static [u8]) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const OPENAI_CHAT_STREAM_TEXT: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"ok\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2}}\n\ndata: [DONE]\n\n";

const ANTHROPIC_STREAM_TEXT: &[u8] = b"data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-5-haiku-latest\",\"content\":[]}}\n\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":1}}\n\ndata: {\"type\":\"message_stop\"}\n\n";

const GEMINI_STREAM_TEXT: &[u8] = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}],\"role\":\"model\"},\"finishReason\":\"STOP\",\"index\":0}],\"usageMetadata\":{\"promptTokenCount\":1,\"candidatesTokenCount\":1,\"totalTokenCount\":2}}\n\n";

const OLLAMA_NDJSON_TEXT: &[u8] = b"{\"message\":{\"role\":\"assistant\",\"content\":\"ok\"},\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"prompt_eval_count\":1,\"eval_count\":1}\n";
