//! Scripted test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, Role, TokenUsage};
use super::provider::LlmProvider;
use crate::error::AgentError;

type Responder = Box<dyn Fn(&ChatRequest, usize) -> Result<String, AgentError> + Send + Sync>;

/// Provider whose replies are scripted per model name.
///
/// Each responder receives the request and the zero-based call index for
/// its model. Calls to an unscripted model fail with a connection error.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    responders: HashMap<String, Responder>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on<F>(mut self, model: &str, responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<String, AgentError> + Send + Sync + 'static,
    {
        self.responders.insert(model.to_string(), Box::new(responder));
        self
    }

    pub(crate) fn with_delay(mut self, model: &str, delay: Duration) -> Self {
        self.delays.insert(model.to_string(), delay);
        self
    }

    /// Number of calls made with `model`.
    pub(crate) fn calls_for(&self, model: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| c.model == model).count())
            .unwrap_or_default()
    }

    /// Last user message sent to `model`.
    pub(crate) fn last_prompt(&self, model: &str) -> Option<String> {
        self.calls.lock().ok().and_then(|calls| {
            calls
                .iter()
                .rev()
                .find(|c| c.model == model)
                .and_then(|c| c.messages.iter().rev().find(|m| m.role == Role::User))
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let call = {
            let mut calls = self.calls.lock().map_err(|_| AgentError::Orchestration {
                message: "call log poisoned".to_string(),
            })?;
            let index = calls.iter().filter(|c| c.model == request.model).count();
            calls.push(request.clone());
            index
        };
        if let Some(delay) = self.delays.get(&request.model) {
            tokio::time::sleep(*delay).await;
        }
        let responder =
            self.responders
                .get(&request.model)
                .ok_or_else(|| AgentError::Connection {
                    message: format!("no script for model {}", request.model),
                })?;
        responder(request, call).map(|content| ChatResponse {
            content,
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }
}

/// Serves each canned response to one incoming connection, in order, on
/// an ephemeral local port. Returns the base URL.
///
/// Responses are `(status line, content type, body)`. Panics when no
/// local port can be bound.
#[allow(clippy::panic)]
pub(crate) fn serve(responses: Vec<(&'static str, &'static str, String)>) -> String {
    use std::io::Write;
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .unwrap_or_else(|e| panic!("cannot bind local HTTP stub: {e}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("local HTTP stub has no address: {e}"));
    std::thread::spawn(move || {
        for (status, content_type, body) in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            drain_request(&mut stream);
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });
    format!("http://{addr}")
}

/// Reads one request: headers, then `Content-Length` bytes of body.
fn drain_request(stream: &mut impl std::io::Read) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut buf) else {
            return;
        };
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + length {
                return;
            }
        }
    }
}

mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;

    use super::*;

    #[test]
    fn test_serve_answers_on_bound_port() {
        let base = serve(vec![("200 OK", "text/plain", "hello".to_string())]);
        let addr = base.trim_start_matches("http://");
        assert!(addr.starts_with("127.0.0.1:"));
        assert_ne!(addr, "127.0.0.1:9");

        let mut stream = TcpStream::connect(addr).unwrap_or_else(|_| unreachable!());
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap_or_else(|_| unreachable!());
        let mut reply = String::new();
        stream
            .read_to_string(&mut reply)
            .unwrap_or_else(|_| unreachable!());
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("hello"));
    }
}
