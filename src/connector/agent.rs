//! Connector for servers running the jailctl HTTP agent.
//!
//! Every operation is a single JSON request against the agent base URL,
//! authenticated with the `X-Agent-Secret` header. Names and IPs are
//! validated before anything is sent.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{Connector, FilterTestResult, JailInfo, RestartMode};
use crate::config::{validate_callback_url, SecureString, Server, Settings};
use crate::config_engine::{DefaultSettings, JailLocalIntegrity, LogpathTest, StructureOutcome};
use crate::error::{JailctlError, Result};
use crate::utils::truncate;
use crate::validation::{validate_filter_name, validate_ip, validate_jail_name};

/// Header carrying the shared agent secret
pub const AGENT_SECRET_HEADER: &str = "X-Agent-Secret";

/// Longest error body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct ContentBody {
    content: String,
}

#[derive(Deserialize)]
struct ModeBody {
    mode: RestartMode,
}

#[derive(Deserialize)]
struct ChangedBody {
    changed: bool,
}

/// Talks to a remote agent over HTTP(S).
pub struct AgentConnector {
    server: Server,
    client: Client,
    base_url: String,
    secret: SecureString,
}

impl AgentConnector {
    pub fn new(server: Server, settings: &Settings) -> Result<Self> {
        let base_url = server.agent_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(JailctlError::Config(format!(
                "Server '{}' has no agent_url",
                server.id
            )));
        }
        let client = Client::builder()
            .timeout(settings.command_timeout())
            .user_agent(format!("jailctl/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JailctlError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let secret = server.get_agent_secret();

        Ok(Self {
            server,
            client,
            base_url,
            secret,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn context(&self, method: &Method, path: &str) -> String {
        format!("{} {}{}", method, self.base_url, path)
    }

    /// Send one request and return the raw response, whatever its status.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AGENT_SECRET_HEADER, self.secret.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| {
            let context = self.context(&method, path);
            if e.is_timeout() {
                JailctlError::timeout(context, e.to_string())
            } else {
                JailctlError::transport(context, e.to_string())
            }
        })
    }

    /// Send a request and fail on any non-2xx status.
    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let response = self.send(method.clone(), path, body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = error_message(response).await;
        Err(status_error(status, &self.context(&method, path), message))
    }

    async fn call_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.call(method.clone(), path, body).await?;
        response.json::<T>().await.map_err(|e| {
            JailctlError::transport(
                self.context(&method, path),
                format!("Invalid response body: {}", e),
            )
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call_json::<(), T>(Method::GET, path, None).await
    }
}

/// Map a non-2xx status onto the error taxonomy.
fn status_error(status: StatusCode, context: &str, message: String) -> JailctlError {
    match status {
        StatusCode::NOT_FOUND => JailctlError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            JailctlError::Validation(message)
        }
        _ => JailctlError::transport(context, format!("HTTP {}: {}", status, message)),
    }
}

/// Best-effort error text: `{"error": ...}` or `{"message": ...}` if the
/// agent sent JSON, the raw body otherwise.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(msg) = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
        {
            return msg.to_string();
        }
    }
    let text = text.trim();
    if text.is_empty() {
        status.to_string()
    } else {
        truncate(text, MAX_ERROR_BODY)
    }
}

#[async_trait]
impl Connector for AgentConnector {
    fn server(&self) -> &Server {
        &self.server
    }

    async fn restart_with_mode(&self) -> Result<RestartMode> {
        let body: ModeBody = self
            .call_json::<(), _>(Method::POST, "/v1/actions/restart", None)
            .await?;
        info!("Restarted fail2ban on {} ({})", self.server.id, body.mode);
        Ok(body.mode)
    }

    async fn reload(&self) -> Result<()> {
        let path = "/v1/actions/reload";
        let response = self.send::<()>(Method::POST, path, None).await?;
        let status = response.status();
        if status.is_success() {
            debug!("Reloaded fail2ban on {}", self.server.id);
            return Ok(());
        }
        let message = error_message(response).await;
        if status == StatusCode::CONFLICT {
            // fail2ban rejected the configuration
            return Err(JailctlError::ReloadFailure {
                message,
                jail: None,
                auto_disabled: false,
            });
        }
        Err(status_error(status, &self.context(&Method::POST, path), message))
    }

    async fn ban_ip(&self, jail: &str, ip: &str) -> Result<()> {
        validate_jail_name(jail)?;
        let ip = validate_ip(ip)?.to_string();
        self.call(Method::POST, &format!("/v1/jails/{}/ban", jail), Some(&json!({ "ip": ip })))
            .await?;
        info!("banip {} in {} on {}", ip, jail, self.server.id);
        Ok(())
    }

    async fn unban_ip(&self, jail: &str, ip: &str) -> Result<()> {
        validate_jail_name(jail)?;
        let ip = validate_ip(ip)?.to_string();
        self.call(Method::POST, &format!("/v1/jails/{}/unban", jail), Some(&json!({ "ip": ip })))
            .await?;
        info!("unbanip {} in {} on {}", ip, jail, self.server.id);
        Ok(())
    }

    async fn get_jail_infos(&self) -> Result<Vec<JailInfo>> {
        let mut infos: Vec<JailInfo> = self.get("/v1/jails").await?;
        infos.sort_by(|a, b| a.jail_name.cmp(&b.jail_name));
        Ok(infos)
    }

    async fn get_all_jails(&self) -> Result<Vec<JailInfo>> {
        let mut jails: Vec<JailInfo> = self.get("/v1/jails/all").await?;
        jails.sort_by(|a, b| a.jail_name.cmp(&b.jail_name));
        Ok(jails)
    }

    async fn create_jail(&self, name: &str, content: &str) -> Result<()> {
        validate_jail_name(name)?;
        self.call(
            Method::POST,
            &format!("/v1/jails/{}", name),
            Some(&json!({ "content": content })),
        )
        .await
        .map(|_| ())
    }

    async fn delete_jail(&self, name: &str) -> Result<()> {
        validate_jail_name(name)?;
        self.call::<()>(Method::DELETE, &format!("/v1/jails/{}", name), None)
            .await
            .map(|_| ())
    }

    async fn get_jail_config(&self, name: &str) -> Result<String> {
        validate_jail_name(name)?;
        let body: ContentBody = self.get(&format!("/v1/jails/{}/config", name)).await?;
        Ok(body.content)
    }

    async fn set_jail_config(&self, name: &str, content: &str) -> Result<()> {
        validate_jail_name(name)?;
        self.call(
            Method::PUT,
            &format!("/v1/jails/{}/config", name),
            Some(&json!({ "content": content })),
        )
        .await
        .map(|_| ())
    }

    async fn get_filter_config(&self, name: &str) -> Result<String> {
        validate_filter_name(name)?;
        let body: ContentBody = self.get(&format!("/v1/filters/{}", name)).await?;
        Ok(body.content)
    }

    async fn set_filter_config(&self, name: &str, content: &str) -> Result<()> {
        validate_filter_name(name)?;
        self.call(
            Method::PUT,
            &format!("/v1/filters/{}", name),
            Some(&json!({ "content": content })),
        )
        .await
        .map(|_| ())
    }

    async fn create_filter(&self, name: &str, content: &str) -> Result<()> {
        validate_filter_name(name)?;
        self.call(
            Method::POST,
            &format!("/v1/filters/{}", name),
            Some(&json!({ "content": content })),
        )
        .await
        .map(|_| ())
    }

    async fn delete_filter(&self, name: &str) -> Result<()> {
        validate_filter_name(name)?;
        self.call::<()>(Method::DELETE, &format!("/v1/filters/{}", name), None)
            .await
            .map(|_| ())
    }

    async fn get_filters(&self) -> Result<Vec<String>> {
        let mut filters: Vec<String> = self.get("/v1/filters").await?;
        filters.sort();
        filters.dedup();
        Ok(filters)
    }

    async fn test_filter(&self, name: &str, log_lines: &[String]) -> Result<FilterTestResult> {
        validate_filter_name(name)?;
        if log_lines.is_empty() {
            return Err(JailctlError::validation("No log lines to test"));
        }
        self.call_json(
            Method::POST,
            &format!("/v1/filters/{}/test", name),
            Some(&json!({ "lines": log_lines })),
        )
        .await
    }

    async fn update_jail_enabled_states(&self, states: &BTreeMap<String, bool>) -> Result<()> {
        for name in states.keys() {
            validate_jail_name(name)?;
        }
        self.call(Method::POST, "/v1/jails/enabled", Some(states))
            .await
            .map(|_| ())
    }

    async fn check_jail_local_integrity(&self) -> Result<JailLocalIntegrity> {
        self.get("/v1/jail-local/integrity").await
    }

    async fn ensure_jail_local_structure(&self) -> Result<StructureOutcome> {
        self.call_json::<(), _>(Method::POST, "/v1/jail-local/ensure", None)
            .await
    }

    async fn update_default_settings(&self, settings: &DefaultSettings) -> Result<()> {
        settings.validate()?;
        self.call(Method::PUT, "/v1/settings/default", Some(settings))
            .await
            .map(|_| ())
    }

    async fn test_logpath_with_resolution(&self, logpath: &str) -> Result<Vec<LogpathTest>> {
        if logpath.trim().is_empty() {
            return Err(JailctlError::validation("No log path given"));
        }
        self.call_json(
            Method::POST,
            "/v1/logpath/test",
            Some(&json!({ "logpath": logpath })),
        )
        .await
    }

    async fn update_action_file(&self, callback_url: &str) -> Result<bool> {
        validate_callback_url(callback_url)?;
        let body: ChangedBody = self
            .call_json(
                Method::PUT,
                "/v1/actions/callback",
                Some(&json!({ "serverId": self.server.id, "callbackUrl": callback_url })),
            )
            .await?;
        Ok(body.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// What the fake agent saw for one request.
    #[derive(Debug)]
    struct Seen {
        method: String,
        path: String,
        secret: Option<String>,
        body: String,
    }

    /// Minimal HTTP/1.1 responder: answers each connection with the next
    /// scripted `(status, body)` and reports the request it received.
    async fn fake_agent(responses: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else { continue };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.lines();
                let mut request_line = lines.next().unwrap_or_default().split_whitespace();
                let method = request_line.next().unwrap_or_default().to_string();
                let path = request_line.next().unwrap_or_default().to_string();
                let mut secret = None;
                let mut length = 0usize;
                for line in lines {
                    if let Some((name, value)) = line.split_once(':') {
                        let name = name.trim().to_ascii_lowercase();
                        if name == "x-agent-secret" {
                            secret = Some(value.trim().to_string());
                        } else if name == "content-length" {
                            length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                while buf.len() < header_end + length {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body_text = String::from_utf8_lossy(&buf[header_end..]).to_string();
                let _ = tx.send(Seen {
                    method,
                    path,
                    secret,
                    body: body_text,
                });

                let reply = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
                let _ = sock.shutdown().await;
            }
        });

        (format!("http://{}", addr), rx)
    }

    fn connector(url: &str) -> AgentConnector {
        let server = Server {
            id: "db1".to_string(),
            server_type: ServerType::Agent,
            agent_url: format!("{}/", url),
            agent_secret: SecureString::from("s3cret"),
            ..Default::default()
        };
        let settings = Settings {
            command_timeout_secs: 1,
            ..Default::default()
        };
        AgentConnector::new(server, &settings).unwrap()
    }

    #[tokio::test]
    async fn test_ban_sends_secret_and_body() {
        let (url, mut seen) = fake_agent(vec![(200, "{}")]).await;
        let conn = connector(&url);
        assert_eq!(conn.base_url(), url);

        conn.ban_ip("sshd", "1.2.3.4").await.unwrap();

        let req = seen.recv().await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/v1/jails/sshd/ban");
        assert_eq!(req.secret.as_deref(), Some("s3cret"));
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body["ip"], "1.2.3.4");
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_agent() {
        // Nothing is listening here; a request would be a transport error
        let conn = connector("http://127.0.0.1:9");
        assert!(matches!(
            conn.ban_ip("sshd", "not-an-ip").await,
            Err(JailctlError::Validation(_))
        ));
        assert!(matches!(
            conn.get_jail_config("../etc").await,
            Err(JailctlError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (url, _seen) = fake_agent(vec![
            (404, r#"{"error":"jail 'nope' does not exist"}"#),
            (422, r#"{"error":"bad bantime"}"#),
            (500, "internal"),
        ])
        .await;
        let conn = connector(&url);

        let err = conn.get_jail_config("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("does not exist"));

        let err = conn.set_jail_config("sshd", "[sshd]\n").await.unwrap_err();
        assert!(matches!(err, JailctlError::Validation(ref m) if m == "bad bantime"));

        let err = conn.get_filters().await.unwrap_err();
        assert!(matches!(err, JailctlError::Transport { .. }));
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_reload_conflict_is_reload_failure() {
        let (url, _seen) = fake_agent(vec![(409, r#"{"error":"No failure-id group"}"#)]).await;
        let conn = connector(&url);

        match conn.reload().await.unwrap_err() {
            JailctlError::ReloadFailure { message, .. } => assert_eq!(message, "No failure-id group"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_jail_infos_are_sorted() {
        let (url, mut seen) = fake_agent(vec![(
            200,
            r#"[{"jailName":"sshd","enabled":true,"totalBanned":1,"newInLastHour":1,"bannedIPs":["1.2.3.4"]},
                {"jailName":"nginx","enabled":true,"totalBanned":0,"newInLastHour":0,"bannedIPs":[]}]"#,
        )])
        .await;
        let conn = connector(&url);

        let infos = conn.get_jail_infos().await.unwrap();
        assert_eq!(infos[0].jail_name, "nginx");
        assert_eq!(infos[1].banned_ips, vec!["1.2.3.4"]);
        assert_eq!(seen.recv().await.unwrap().method, "GET");
    }

    #[tokio::test]
    async fn test_restart_reports_mode() {
        let (url, _seen) = fake_agent(vec![(200, r#"{"mode":"reload"}"#)]).await;
        let conn = connector(&url);
        assert_eq!(conn.restart_with_mode().await.unwrap(), RestartMode::Reload);
    }

    #[tokio::test]
    async fn test_update_action_file_reports_change() {
        let (url, mut seen) = fake_agent(vec![(200, r#"{"changed":true}"#), (200, r#"{"changed":false}"#)]).await;
        let conn = connector(&url);

        assert!(conn.update_action_file("https://panel.example.com/hook").await.unwrap());
        assert!(!conn.update_action_file("https://panel.example.com/hook").await.unwrap());

        let req = seen.recv().await.unwrap();
        assert_eq!(req.method, "PUT");
        assert_eq!(req.path, "/v1/actions/callback");
        assert!(req.body.contains("panel.example.com"));

        assert!(conn.update_action_file("https://panel/'$(id)'").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_json_is_transport_error() {
        let (url, _seen) = fake_agent(vec![(200, "not json")]).await;
        let conn = connector(&url);
        assert!(matches!(
            conn.get_all_jails().await,
            Err(JailctlError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_hanging_agent_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            // Accept and hold the connection without answering
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let conn = connector(&url);
        let err = conn.reload().await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    }

    #[test]
    fn test_new_requires_url() {
        let server = Server {
            id: "db1".to_string(),
            server_type: ServerType::Agent,
            ..Default::default()
        };
        assert!(matches!(
            AgentConnector::new(server, &Settings::default()),
            Err(JailctlError::Config(_))
        ));
    }
}
