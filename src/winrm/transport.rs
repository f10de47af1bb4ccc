//! Transport boundary to the remote management service.
//!
//! The execution client only depends on [`ShellTransport`]: something that
//! can run one command line in a remote shell and report what happened.
//! The production implementation speaks the WS-Man shell lifecycle over
//! HTTP; tests substitute scripted stubs.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Captured output of one remote command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code reported by the remote shell
    pub exit_code: i32,
    /// Buffered standard output
    pub stdout: String,
    /// Buffered standard error
    pub stderr: String,
}

/// A channel capable of running one command line in a remote shell.
///
/// `Ok` means the remote shell ran the command to completion, whatever its
/// exit code. `Err` means the command could not be run at all; callers may
/// treat that as transient and retry.
pub trait ShellTransport {
    /// Runs `command` remotely and returns its captured output.
    fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Connection coordinates of the WS-Man service.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Target hostname or IP address
    pub host: String,
    /// Target port
    pub port: u16,
    /// Whether to use TLS
    pub use_tls: bool,
    /// Per-request network timeout
    pub timeout: Duration,
}

impl Endpoint {
    /// URL of the WS-Man service on this endpoint.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}/wsman", scheme, self.host, self.port)
    }
}

const SHELL_RESOURCE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";

const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";

/// WS-Man shell transport over HTTP.
///
/// Implements the minimal shell lifecycle needed to run one command: create
/// a shell, issue the command line, drain the buffered output streams until
/// the command completes, then release the shell. Credentials ride on the
/// HTTP layer; the negotiated authentication handshake is the HTTP stack's
/// concern, not this module's.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
    authorization: String,
}

impl HttpTransport {
    /// Builds a transport for `endpoint`, optionally routed through `proxy`.
    pub fn new(
        endpoint: &Endpoint,
        username: &str,
        password: &str,
        proxy: Option<&Url>,
    ) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new().timeout(endpoint.timeout);

        if let Some(proxy) = proxy {
            let proxy = ureq::Proxy::new(proxy.as_str()).map_err(|e| {
                Error::SessionCreation(format!("proxy rejected by HTTP agent: {}", e))
            })?;
            builder = builder.proxy(proxy);
        }

        let credentials = STANDARD.encode(format!("{}:{}", username, password));

        Ok(Self {
            agent: builder.build(),
            url: endpoint.url(),
            authorization: format!("Basic {}", credentials),
        })
    }

    fn post(&self, envelope: &str) -> Result<String> {
        let sent = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/soap+xml;charset=UTF-8")
            .set("Authorization", &self.authorization)
            .send_string(envelope);

        match sent {
            Ok(response) => response
                .into_string()
                .map_err(|e| Error::Transport(format!("failed to read WS-Man response: {}", e))),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(Error::Transport(format!(
                    "WS-Man endpoint returned HTTP {}: {}",
                    code,
                    fault_text(&body)
                )))
            }
            Err(e) => Err(Error::Transport(format!("WS-Man request failed: {}", e))),
        }
    }

    fn envelope(&self, action: &str, shell_id: Option<&str>, body: &str) -> String {
        let selector = match shell_id {
            Some(id) => format!(
                "<w:SelectorSet><w:Selector Name=\"ShellId\">{}</w:Selector></w:SelectorSet>",
                id
            ),
            None => String::new(),
        };

        format!(
            concat!(
                "<s:Envelope",
                " xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\"",
                " xmlns:wsa=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\"",
                " xmlns:w=\"http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd\"",
                " xmlns:rsp=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell\">",
                "<s:Header>",
                "<wsa:To>{url}</wsa:To>",
                "<w:ResourceURI s:mustUnderstand=\"true\">{resource}</w:ResourceURI>",
                "<wsa:ReplyTo><wsa:Address s:mustUnderstand=\"true\">",
                "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous",
                "</wsa:Address></wsa:ReplyTo>",
                "<wsa:Action s:mustUnderstand=\"true\">{action}</wsa:Action>",
                "<wsa:MessageID>uuid:{message_id}</wsa:MessageID>",
                "<w:MaxEnvelopeSize s:mustUnderstand=\"true\">153600</w:MaxEnvelopeSize>",
                "<w:OperationTimeout>PT60S</w:OperationTimeout>",
                "{selector}",
                "</s:Header>",
                "<s:Body>{body}</s:Body>",
                "</s:Envelope>"
            ),
            url = self.url,
            resource = SHELL_RESOURCE,
            action = action,
            message_id = Uuid::new_v4(),
            selector = selector,
            body = body,
        )
    }

    fn create_shell(&self) -> Result<String> {
        let body = "<rsp:Shell>\
             <rsp:InputStreams>stdin</rsp:InputStreams>\
             <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>\
             </rsp:Shell>";

        let response = self.post(&self.envelope(ACTION_CREATE, None, body))?;

        let shell_id = element_text(&response, "ShellId")
            .or_else(|| selector_text(&response, "ShellId"))
            .ok_or_else(|| {
                Error::Transport("shell identifier missing from create response".to_string())
            })?;

        debug!("Created remote shell {}", shell_id);
        Ok(shell_id.to_string())
    }

    fn run_in_shell(&self, shell_id: &str, command: &str) -> Result<CommandOutput> {
        let body = format!(
            "<rsp:CommandLine><rsp:Command>{}</rsp:Command></rsp:CommandLine>",
            xml_escape(command)
        );
        let response = self.post(&self.envelope(ACTION_COMMAND, Some(shell_id), &body))?;

        let command_id = element_text(&response, "CommandId")
            .ok_or_else(|| {
                Error::Transport("command identifier missing from response".to_string())
            })?
            .to_string();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;

        loop {
            let body = format!(
                "<rsp:Receive><rsp:DesiredStream CommandId=\"{}\">\
                 stdout stderr</rsp:DesiredStream></rsp:Receive>",
                command_id
            );
            let response = self.post(&self.envelope(ACTION_RECEIVE, Some(shell_id), &body))?;

            collect_stream(&response, "stdout", &mut stdout)?;
            collect_stream(&response, "stderr", &mut stderr)?;

            if response.contains("CommandState/Done") {
                if let Some(code) = element_text(&response, "ExitCode") {
                    exit_code = code.trim().parse().unwrap_or(0);
                }
                break;
            }
        }

        self.signal_terminate(shell_id, &command_id);

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn signal_terminate(&self, shell_id: &str, command_id: &str) {
        let body = format!(
            "<rsp:Signal CommandId=\"{}\"><rsp:Code>{}</rsp:Code></rsp:Signal>",
            command_id, SIGNAL_TERMINATE
        );
        if let Err(e) = self.post(&self.envelope(ACTION_SIGNAL, Some(shell_id), &body)) {
            debug!("Failed to signal command {}: {}", command_id, e);
        }
    }

    fn close_shell(&self, shell_id: &str) {
        if let Err(e) = self.post(&self.envelope(ACTION_DELETE, Some(shell_id), "")) {
            debug!("Failed to release remote shell {}: {}", shell_id, e);
        }
    }
}

impl ShellTransport for HttpTransport {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let shell_id = self.create_shell()?;
        let result = self.run_in_shell(&shell_id, command);
        self.close_shell(&shell_id);
        result
    }
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Text content of the first element whose local name is `local`,
/// regardless of namespace prefix or attributes.
fn element_text<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    let bytes = xml.as_bytes();
    let mut search = 0;

    while let Some(rel) = xml[search..].find(local) {
        let abs = search + rel;
        let end_of_name = abs + local.len();
        search = end_of_name;

        // The match must be an element name inside an opening tag:
        // walk back over any namespace prefix to the '<'.
        let mut tag_start = abs;
        while tag_start > 0 {
            let c = bytes[tag_start - 1];
            if c == b':' || c.is_ascii_alphanumeric() {
                tag_start -= 1;
            } else {
                break;
            }
        }
        if tag_start == 0 || bytes[tag_start - 1] != b'<' || bytes[tag_start] == b'/' {
            continue;
        }

        let content_start = match bytes.get(end_of_name).copied() {
            Some(b'>') => end_of_name + 1,
            Some(c) if c.is_ascii_whitespace() => {
                let rest = &xml[end_of_name..];
                let gt = match rest.find('>') {
                    Some(i) => i,
                    None => return None,
                };
                if rest[..gt].ends_with('/') {
                    continue;
                }
                end_of_name + gt + 1
            }
            _ => continue,
        };

        let content_end = xml[content_start..].find('<')? + content_start;
        return Some(&xml[content_start..content_end]);
    }

    None
}

/// Text content of a `<w:Selector Name="...">` element.
fn selector_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("Name=\"{}\">", name);
    let start = xml.find(&marker)? + marker.len();
    let end = xml[start..].find('<')? + start;
    Some(&xml[start..end])
}

/// Appends the decoded payloads of every `<rsp:Stream Name="...">` element
/// for the given stream name.
fn collect_stream(xml: &str, name: &str, into: &mut String) -> Result<()> {
    let marker = format!("Name=\"{}\"", name);
    let mut search = 0;

    while let Some(pos) = xml[search..].find(&marker) {
        let after_marker = search + pos + marker.len();
        let rest = &xml[after_marker..];

        let tag_end = match rest.find('>') {
            Some(i) => i,
            None => break,
        };

        // Self-closing element carries no payload.
        if rest[..tag_end].ends_with('/') {
            search = after_marker + tag_end;
            continue;
        }

        let content_start = tag_end + 1;
        let content_end = match rest[content_start..].find('<') {
            Some(i) => content_start + i,
            None => break,
        };

        let payload = rest[content_start..content_end].trim();
        if !payload.is_empty() {
            let bytes = STANDARD
                .decode(payload)
                .map_err(|e| Error::Transport(format!("invalid stream payload: {}", e)))?;
            into.push_str(&String::from_utf8_lossy(&bytes));
        }

        search = after_marker + content_end;
    }

    Ok(())
}

/// Extracts a human-readable reason from a SOAP fault body.
fn fault_text(body: &str) -> String {
    if let Some(text) = element_text(body, "Text") {
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    let snippet: String = body.chars().take(200).collect();
    if snippet.is_empty() {
        "no response body".to_string()
    } else {
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint {
            host: "winhost".to_string(),
            port: 5986,
            use_tls: true,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(endpoint.url(), "https://winhost:5986/wsman");

        let plain = Endpoint {
            use_tls: false,
            port: 5985,
            ..endpoint
        };
        assert_eq!(plain.url(), "http://winhost:5985/wsman");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(
            xml_escape("a < b && c > 'd' \"e\""),
            "a &lt; b &amp;&amp; c &gt; &apos;d&apos; &quot;e&quot;"
        );
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn test_element_text() {
        let xml = "<rsp:CommandResponse><rsp:CommandId>ABC-123</rsp:CommandId></rsp:CommandResponse>";
        assert_eq!(element_text(xml, "CommandId"), Some("ABC-123"));
        assert_eq!(element_text(xml, "ShellId"), None);
    }

    #[test]
    fn test_selector_text() {
        let xml = "<w:SelectorSet><w:Selector Name=\"ShellId\">SHELL-9</w:Selector></w:SelectorSet>";
        assert_eq!(selector_text(xml, "ShellId"), Some("SHELL-9"));
    }

    #[test]
    fn test_collect_stream_decodes_and_appends() {
        // "hi" and "!" base64-encoded.
        let xml = "<rsp:ReceiveResponse>\
                   <rsp:Stream Name=\"stdout\" CommandId=\"C1\">aGk=</rsp:Stream>\
                   <rsp:Stream Name=\"stderr\" CommandId=\"C1\">b29wcw==</rsp:Stream>\
                   <rsp:Stream Name=\"stdout\" CommandId=\"C1\">IQ==</rsp:Stream>\
                   </rsp:ReceiveResponse>";

        let mut stdout = String::new();
        collect_stream(xml, "stdout", &mut stdout).unwrap();
        assert_eq!(stdout, "hi!");

        let mut stderr = String::new();
        collect_stream(xml, "stderr", &mut stderr).unwrap();
        assert_eq!(stderr, "oops");
    }

    #[test]
    fn test_collect_stream_skips_empty_and_self_closing() {
        let xml = "<rsp:Stream Name=\"stdout\" End=\"true\"/>\
                   <rsp:Stream Name=\"stdout\"></rsp:Stream>";

        let mut stdout = String::new();
        collect_stream(xml, "stdout", &mut stdout).unwrap();
        assert_eq!(stdout, "");
    }

    #[test]
    fn test_collect_stream_rejects_bad_payload() {
        let xml = "<rsp:Stream Name=\"stdout\">@@not-base64@@</rsp:Stream>";
        let mut stdout = String::new();
        assert!(collect_stream(xml, "stdout", &mut stdout).is_err());
    }

    #[test]
    fn test_fault_text_prefers_reason() {
        let body = "<s:Fault><s:Reason><s:Text xml:lang=\"en-US\">Access is denied.</s:Text>\
                    </s:Reason></s:Fault>";
        assert_eq!(fault_text(body), "Access is denied.");
        assert_eq!(fault_text(""), "no response body");
    }
}
