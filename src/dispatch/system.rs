//! # System Commands
//!
//! Runs the actions that leave the input domain: launching applications,
//! shell command lines, opening links, webhooks and OBS requests.
//!
//! Launchers and link openers are fire-and-forget: success means the
//! process started. Shell commands are awaited and a non-zero exit is a
//! failure. HTTP requests fail on transport errors and on 4xx/5xx.

use reqwest::{Client, Method};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::obs::ObsClient;
use crate::binding::action::{HttpMethod, SystemCommand};
use crate::error::DispatchError;
use crate::telemetry::OutputKind;

#[cfg(target_os = "macos")]
const LINK_OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const LINK_OPENER: &str = "xdg-open";

/// Telemetry bucket for a system command.
#[must_use]
pub fn output_kind(command: &SystemCommand) -> OutputKind {
    match command {
        SystemCommand::LaunchApp { .. } => OutputKind::AppLaunch,
        SystemCommand::Shell { .. } => OutputKind::Command,
        SystemCommand::OpenLink { .. } => OutputKind::Link,
        SystemCommand::HttpRequest { .. } => OutputKind::Webhook,
        SystemCommand::Obs { .. } => OutputKind::ObsCall,
    }
}

fn http_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

/// Executes [`SystemCommand`]s.
#[derive(Debug)]
pub struct SystemRunner {
    http: Client,
    obs: ObsClient,
}

impl SystemRunner {
    /// Creates a runner whose HTTP requests time out after `http_timeout`.
    #[must_use]
    pub fn new(http_timeout: Duration, obs: ObsClient) -> Self {
        let http = Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, obs }
    }

    /// Runs one command to completion.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] variant matching the command kind.
    pub async fn run(&self, command: &SystemCommand) -> Result<(), DispatchError> {
        match command {
            SystemCommand::LaunchApp { target, args } => launch(target, args),
            SystemCommand::Shell { command } => shell(command).await,
            SystemCommand::OpenLink { url } => open_link(url),
            SystemCommand::HttpRequest {
                method,
                url,
                headers,
                body,
            } => {
                let mut request = self.http.request(http_method(*method), url.as_str());
                for (name, value) in headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(body) = body {
                    request = request.body(body.clone());
                }
                let status = request.send().await?.error_for_status()?.status();
                debug!(%url, %status, "Webhook delivered");
                Ok(())
            }
            SystemCommand::Obs {
                request_type,
                request_data,
            } => self.obs.call(request_type, request_data.clone()).await.map(|_| ()),
        }
    }
}

fn spawn_detached(command: &mut Command, what: &str) -> Result<(), DispatchError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| DispatchError::Command(format!("{}: {}", what, e)))
}

#[cfg(target_os = "macos")]
fn launch(target: &str, args: &[String]) -> Result<(), DispatchError> {
    let mut command = Command::new("open");
    command.arg("-a").arg(target);
    if !args.is_empty() {
        command.arg("--args").args(args);
    }
    spawn_detached(&mut command, target)
}

#[cfg(not(target_os = "macos"))]
fn launch(target: &str, args: &[String]) -> Result<(), DispatchError> {
    spawn_detached(Command::new(target).args(args), target)
}

fn open_link(url: &str) -> Result<(), DispatchError> {
    if !url.contains("://") {
        return Err(DispatchError::Command(format!("not a URL: {}", url)));
    }
    spawn_detached(Command::new(LINK_OPENER).arg(url), LINK_OPENER)
}

async fn shell(line: &str) -> Result<(), DispatchError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(line)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DispatchError::Command(e.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("exited with {}", output.status));
    Err(DispatchError::Command(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn runner() -> SystemRunner {
        SystemRunner::new(Duration::from_secs(2), ObsClient::default())
    }

    /// Answers one HTTP request with `status` and returns the request head.
    async fn http_once(status: u16) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let reply = format!("HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status);
            stream.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{}/hook", addr), handle)
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_output_kinds() {
        let link = SystemCommand::OpenLink { url: "https://x".into() };
        let shell = SystemCommand::Shell { command: "true".into() };
        assert_eq!(output_kind(&link), OutputKind::Link);
        assert_eq!(output_kind(&shell), OutputKind::Command);
    }

    // ==================== Shell Tests ====================

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_success() {
        let command = SystemCommand::Shell { command: "exit 0".into() };
        assert_eq!(runner().run(&command).await, Ok(()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_failure_reports_stderr() {
        let command = SystemCommand::Shell {
            command: "echo nope >&2; exit 2".into(),
        };
        assert_eq!(
            runner().run(&command).await,
            Err(DispatchError::Command("nope".to_string()))
        );
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[tokio::test]
    async fn test_launch_missing_binary_fails() {
        let command = SystemCommand::LaunchApp {
            target: "/nonexistent/controller-keys-app".into(),
            args: vec![],
        };
        assert!(matches!(runner().run(&command).await, Err(DispatchError::Command(_))));
    }

    #[tokio::test]
    async fn test_open_link_rejects_non_url() {
        let command = SystemCommand::OpenLink { url: "example".into() };
        assert!(matches!(runner().run(&command).await, Err(DispatchError::Command(_))));
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_http_request_sends_method_headers_body() {
        let (url, server) = http_once(204).await;
        let mut headers = BTreeMap::new();
        headers.insert("X-Token".to_string(), "abc".to_string());
        let command = SystemCommand::HttpRequest {
            method: HttpMethod::Put,
            url,
            headers,
            body: Some("{\"on\":true}".to_string()),
        };

        assert_eq!(runner().run(&command).await, Ok(()));
        let head = server.await.unwrap();
        assert!(head.starts_with("PUT /hook HTTP/1.1"), "{}", head);
        assert!(head.to_lowercase().contains("x-token: abc"));
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let (url, _server) = http_once(500).await;
        let command = SystemCommand::HttpRequest {
            method: HttpMethod::Post,
            url,
            headers: BTreeMap::new(),
            body: None,
        };
        assert!(matches!(runner().run(&command).await, Err(DispatchError::Http(_))));
    }
}
