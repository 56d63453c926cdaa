use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::config::CoachConfig;
use crate::error::GenerationError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER_BODY_MAX_CHARS: usize = 512;

/// Image attached to a text-generation request. `data` is base64 without any
/// data-URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub image: Option<ImageAttachment>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &TextRequest) -> Result<String, GenerationError>;
}

/// One provider, one model, one deadline and a hard token ceiling. Makes
/// exactly one attempt per call.
pub struct GenerationClient {
    provider: Box<dyn TextProvider>,
    model: String,
    timeout: Duration,
    token_cap: u32,
}

impl GenerationClient {
    pub fn new(
        provider: Box<dyn TextProvider>,
        model: impl Into<String>,
        timeout: Duration,
        token_cap: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
            token_cap,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate_text(
        &self,
        system: Option<&str>,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        self.generate_with_image(system, user, None, max_tokens)
    }

    pub fn generate_with_image(
        &self,
        system: Option<&str>,
        user: &str,
        image: Option<ImageAttachment>,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = TextRequest {
            model: self.model.clone(),
            system: system.map(str::to_string),
            user: user.to_string(),
            image,
            max_tokens: max_tokens.clamp(1, self.token_cap),
            timeout: self.timeout,
        };
        let text = self.provider.generate(&request)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(trimmed.to_string())
    }
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    api_base: String,
    api_key: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &CoachConfig) -> Self {
        Self::new(
            config.anthropic_api_base.clone(),
            config.anthropic_api_key.clone(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.api_base)
    }
}

impl TextProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn generate(&self, request: &TextRequest) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential("ANTHROPIC_API_KEY"))?;
        let http = HttpClient::builder()
            .timeout(request.timeout)
            .build()
            .map_err(GenerationError::from_reqwest)?;
        let response = http
            .post(self.endpoint())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .json(&anthropic_payload(request))
            .send()
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        let body = response.text().map_err(GenerationError::from_reqwest)?;
        if !status.is_success() {
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                body: truncate_text(&body, PROVIDER_BODY_MAX_CHARS),
            });
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationError::Transport(format!("anthropic returned invalid JSON: {err}"))
        })?;
        extract_first_text(&parsed).ok_or(GenerationError::EmptyResponse)
    }
}

pub(crate) fn anthropic_payload(request: &TextRequest) -> Value {
    let mut content = Vec::new();
    if let Some(image) = request.image.as_ref() {
        content.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": image.data,
            }
        }));
    }
    content.push(json!({
        "type": "text",
        "text": request.user,
    }));

    let mut payload = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [{
            "role": "user",
            "content": content,
        }],
    });
    if let Some(system) = request.system.as_deref() {
        payload["system"] = Value::String(system.to_string());
    }
    payload
}

/// First non-blank text block of a Messages response, trimmed.
pub(crate) fn extract_first_text(response: &Value) -> Option<String> {
    response
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter(|block| {
            block
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| kind == "text")
                .unwrap_or(true)
        })
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn text_request(timeout: Duration) -> TextRequest {
        TextRequest {
            model: "claude-test".to_string(),
            system: Some("be brief".to_string()),
            user: "hi".to_string(),
            image: None,
            max_tokens: 20,
            timeout,
        }
    }

    /// Reads one request: headers plus a `Content-Length` body.
    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&raw).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let body_len = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if !name.eq_ignore_ascii_case("content-length") {
                        return None;
                    }
                    value.trim().parse::<usize>().ok()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + body_len {
                return text;
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    #[test]
    fn silent_provider_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let _ = release_rx.recv_timeout(Duration::from_secs(10));
            drop(stream);
        });

        let provider = AnthropicProvider::new(base, Some("sk-test".to_string()));
        let result = provider.generate(&text_request(Duration::from_millis(800)));
        assert_eq!(result, Err(GenerationError::Timeout));

        release_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn non_success_status_keeps_a_truncated_body() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        let body = format!(
            "{{\"error\":\"overloaded\",\"detail\":\"{}\"}}",
            "x".repeat(700)
        );
        let reply_body = body.clone();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let reply = format!(
                "HTTP/1.1 529 Site Overloaded\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply_body.len(),
                reply_body
            );
            stream.write_all(reply.as_bytes()).unwrap();
            request
        });

        let provider = AnthropicProvider::new(base, Some("sk-test".to_string()));
        let err = provider
            .generate(&text_request(Duration::from_secs(5)))
            .unwrap_err();
        match err {
            GenerationError::Provider { status, body: logged } => {
                assert_eq!(status, 529);
                assert!(logged.starts_with("{\"error\":\"overloaded\""));
                assert_eq!(logged.chars().count(), PROVIDER_BODY_MAX_CHARS + 1);
                assert!(logged.ends_with('…'));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /v1/messages "));
        assert!(request.contains("x-api-key: sk-test"));
        assert!(request.contains("anthropic-version: 2023-06-01"));
    }

    #[derive(Clone, Default)]
    struct CapturingProvider {
        seen: Arc<Mutex<Vec<TextRequest>>>,
        reply: String,
    }

    impl TextProvider for CapturingProvider {
        fn name(&self) -> &str {
            "capture"
        }

        fn generate(&self, request: &TextRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn client_caps_tokens_and_trims_output() {
        let provider = CapturingProvider {
            reply: "\n  Lighter closet already 🧥  \n".to_string(),
            ..CapturingProvider::default()
        };
        let seen = Arc::clone(&provider.seen);
        let client = GenerationClient::new(
            Box::new(provider),
            "claude-test",
            Duration::from_secs(12),
            200,
        );
        let text = client
            .generate_text(Some("system"), "user", 4000)
            .unwrap();
        assert_eq!(text, "Lighter closet already 🧥");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_tokens, 200);
        assert_eq!(seen[0].timeout, Duration::from_secs(12));
        assert_eq!(seen[0].model, "claude-test");
    }

    #[test]
    fn blank_output_is_an_empty_response() {
        let client = GenerationClient::new(
            Box::new(CapturingProvider {
                reply: "   ".to_string(),
                ..CapturingProvider::default()
            }),
            "m",
            Duration::from_secs(10),
            200,
        );
        assert_eq!(
            client.generate_text(None, "hi", 50),
            Err(GenerationError::EmptyResponse)
        );
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let provider = AnthropicProvider::new("http://127.0.0.1:9/v1/", None);
        let request = TextRequest {
            model: "m".to_string(),
            system: None,
            user: "hi".to_string(),
            image: None,
            max_tokens: 10,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            provider.generate(&request),
            Err(GenerationError::MissingCredential("ANTHROPIC_API_KEY"))
        );
        assert_eq!(provider.endpoint(), "http://127.0.0.1:9/v1/messages");
    }

    #[test]
    fn payload_puts_image_before_text_and_system_on_top() {
        let request = TextRequest {
            model: "claude-vision".to_string(),
            system: Some("be kind".to_string()),
            user: "describe".to_string(),
            image: Some(ImageAttachment {
                mime_type: "image/png".to_string(),
                data: "iVBORw0KGgo=".to_string(),
            }),
            max_tokens: 1500,
            timeout: Duration::from_secs(30),
        };
        let payload = anthropic_payload(&request);
        assert_eq!(payload["system"], json!("be kind"));
        assert_eq!(payload["max_tokens"], json!(1500));
        let content = &payload["messages"][0]["content"];
        assert_eq!(content[0]["type"], json!("image"));
        assert_eq!(content[0]["source"]["media_type"], json!("image/png"));
        assert_eq!(content[1]["text"], json!("describe"));

        let bare = TextRequest {
            system: None,
            image: None,
            ..request
        };
        let payload = anthropic_payload(&bare);
        assert!(payload.get("system").is_none());
        assert_eq!(payload["messages"][0]["content"][0]["type"], json!("text"));
    }

    #[test]
    fn extracts_first_text_block() {
        let response = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "   "},
                {"type": "text", "text": "  Bye, old coat 🧥 "},
                {"type": "text", "text": "second"},
            ]
        });
        assert_eq!(
            extract_first_text(&response).as_deref(),
            Some("Bye, old coat 🧥")
        );
        assert_eq!(extract_first_text(&json!({"content": []})), None);
        assert_eq!(extract_first_text(&json!({"error": "x"})), None);
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
