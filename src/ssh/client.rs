// ABOUTME: SSH session management using russh.
// ABOUTME: Drives one interactive CLI shell per device and reads output up to the prompt.

use super::error::{Error, Result};
use crate::session::{CommandSession, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::UnixStream;

/// Commands that turn off output paging. Devices ignore the ones they don't know.
const PAGING_OFF: [&str; 2] = ["terminal length 0", "terminal pager 0"];

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Password, for devices without key authentication.
    pub password: Option<String>,
    /// Optional path to private key file.
    /// If None, will try password, then SSH agent, then default key locations.
    pub key_path: Option<PathBuf>,
    /// Whether to accept unknown hosts (Trust On First Use).
    /// If false, connection to unknown hosts will fail.
    pub trust_on_first_use: bool,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Timeout for ordinary commands (default: 60 seconds).
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            password: None,
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            command_timeout: Duration::from_secs(60),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) if self.trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                let learn_result = match &self.known_hosts_path {
                    Some(path) => learn_known_hosts_path(&self.host, self.port, server_public_key, path),
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learn_result {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!("host key for {}:{} has changed", self.host, self.port);
                Ok(false)
            }
            Err(_) => Ok(self.trust_on_first_use),
        }
    }
}

/// Authentication method resolved from config.
enum AuthMethod {
    Password(String),
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// An established SSH session with one interactive CLI shell.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
    shell: tokio::sync::Mutex<Channel<Msg>>,
    /// Prompt text without its trailing `#`/`>`, learned after login.
    prompt_base: Mutex<Option<String>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .field("prompt_base", &*self.prompt_base.lock())
            .finish()
    }
}

impl Session {
    /// Connect, authenticate, open a shell and disable paging.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let auth_method = Self::resolve_auth_method(&config).await?;

        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| {
            if e.to_string().contains("Connection refused") {
                Error::Connection(format!("connection refused to {}:{}", config.host, config.port))
            } else {
                Error::Connection(e.to_string())
            }
        })?;

        if !Self::authenticate(&mut handle, &config, auth_method).await? {
            return Err(Error::AuthenticationFailed);
        }

        let channel = Self::open_shell(&handle).await?;
        let session = Self {
            config,
            handle,
            shell: tokio::sync::Mutex::new(channel),
            prompt_base: Mutex::new(None),
        };
        session.learn_prompt().await?;
        for cmd in PAGING_OFF {
            session.exchange(cmd, session.config.command_timeout, None).await?;
        }
        tracing::debug!(host = %session.config.host, "interactive shell ready");
        Ok(session)
    }

    /// Resolve which authentication method to use.
    async fn resolve_auth_method(config: &SessionConfig) -> Result<AuthMethod> {
        if let Some(key_path) = &config.key_path {
            let key = load_secret_key(key_path, None).map_err(|e| Error::KeyLoadFailed {
                path: key_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(AuthMethod::KeyFile(Arc::new(key)));
        }

        // Network devices mostly authenticate with passwords.
        if let Some(password) = &config.password {
            return Ok(AuthMethod::Password(password.clone()));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(AuthMethod::Agent(agent));
        }

        let home = std::env::var("HOME").map_err(|_| {
            Error::AgentUnavailable("SSH agent not available and HOME not set".to_string())
        })?;

        let default_keys = [
            format!("{}/.ssh/id_ed25519", home),
            format!("{}/.ssh/id_rsa", home),
            format!("{}/.ssh/id_ecdsa", home),
        ];

        for key_path in &default_keys {
            if let Ok(key) = load_secret_key(key_path, None) {
                return Ok(AuthMethod::KeyFile(Arc::new(key)));
            }
        }

        Err(Error::AgentUnavailable(
            "no password, SSH agent or default keys available".to_string(),
        ))
    }

    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Password(password) => {
                let result = handle
                    .authenticate_password(&config.user, password)
                    .await
                    .map_err(Error::Protocol)?;
                Ok(result.success())
            }
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                if keys.is_empty() {
                    return Err(Error::AgentUnavailable("no keys in SSH agent".to_string()));
                }

                for key in &keys {
                    match handle
                        .authenticate_publickey_with(&config.user, key.clone(), None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                let result = handle
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(Error::Protocol)?;

                Ok(result.success())
            }
        }
    }

    async fn open_shell(handle: &Handle<SshHandler>) -> Result<Channel<Msg>> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Shell(format!("failed to open channel: {}", e)))?;
        channel
            .request_pty(false, "vt100", 511, 24, 0, 0, &[])
            .await
            .map_err(|e| Error::Shell(format!("failed to request pty: {}", e)))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| Error::Shell(format!("failed to start shell: {}", e)))?;
        Ok(channel)
    }

    /// Read the login banner up to the first prompt and remember its name.
    async fn learn_prompt(&self) -> Result<()> {
        let mut shell = self.shell.lock().await;
        shell.data(&b"\n"[..]).await.map_err(Error::Protocol)?;
        let timeout = self.config.command_timeout;
        let raw = tokio::time::timeout(timeout, read_until(&mut shell, |buf| ends_with_prompt(buf, None)))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))??;
        let base = last_line(&raw).trim_end().trim_end_matches(['#', '>']).to_string();
        tracing::debug!(prompt = %base, "learned device prompt");
        *self.prompt_base.lock() = Some(base);
        Ok(())
    }

    /// Write one command and read its output.
    async fn exchange(&self, command: &str, timeout: Duration, terminator: Option<&Regex>) -> Result<String> {
        let prompt = self.prompt_base.lock().clone();
        let mut shell = self.shell.lock().await;

        // Commands that already end in carriage returns answer their own confirmations.
        let line = if command.ends_with('\r') {
            command.to_string()
        } else {
            format!("{command}\n")
        };
        shell.data(line.as_bytes()).await.map_err(Error::Protocol)?;

        let done = |buf: &str| {
            terminator.is_some_and(|re| re.is_match(buf)) || ends_with_prompt(buf, prompt.as_deref())
        };
        let raw = tokio::time::timeout(timeout, read_until(&mut shell, done))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))??;
        Ok(strip_echo_and_prompt(&raw))
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        let shell = self.shell.into_inner();
        if let Err(e) = shell.eof().await {
            tracing::debug!("failed to send EOF on shell: {e}");
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}

#[async_trait]
impl CommandSession for Session {
    async fn send(&self, command: &str) -> std::result::Result<String, SessionError> {
        tracing::debug!(%command, "send");
        Ok(self.exchange(command, self.config.command_timeout, None).await?)
    }

    async fn send_long(
        &self,
        command: &str,
        timeout: Duration,
        terminator: &str,
    ) -> std::result::Result<String, SessionError> {
        tracing::debug!(command = %command.trim_end(), ?timeout, "send_long");
        let terminator = if terminator.is_empty() {
            None
        } else {
            Some(Regex::new(terminator).map_err(|e| Error::Terminator {
                pattern: terminator.to_string(),
                reason: e.to_string(),
            })?)
        };
        Ok(self.exchange(command, timeout, terminator.as_ref()).await?)
    }
}

/// Bytes at the end of the output that prompt and terminator checks look at.
const MATCH_WINDOW: usize = 4096;

/// Channel output decoded as it arrives. A multibyte character split across
/// two chunks is held back until its remaining bytes show up.
#[derive(Debug, Default)]
struct OutputBuffer {
    text: String,
    pending: Vec<u8>,
}

impl OutputBuffer {
    fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(rest) => {
                    self.text.push_str(rest);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    self.text.push_str(&String::from_utf8_lossy(&self.pending[start..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }

    /// Tail of the output, at most `MATCH_WINDOW` bytes.
    fn window(&self) -> &str {
        let mut cut = self.text.len().saturating_sub(MATCH_WINDOW);
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        &self.text[cut..]
    }

    fn finish(self) -> String {
        self.text.replace("\r\n", "\n").replace('\r', "")
    }
}

async fn read_until(channel: &mut Channel<Msg>, done: impl Fn(&str) -> bool) -> Result<String> {
    let mut buf = OutputBuffer::default();
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                buf.push(&data);
                if done(buf.window()) {
                    return Ok(buf.finish());
                }
            }
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => return Err(Error::ChannelClosed),
            Some(_) => {}
        }
    }
}

fn prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w.\-/:@()]+[#>]\s*$").expect("static regex"))
}

/// True if the buffer's last line is a CLI prompt. With a learned base the
/// prompt must start with it, which tolerates mode suffixes like `(config)`.
fn ends_with_prompt(buf: &str, base: Option<&str>) -> bool {
    let tail = last_line(buf).trim_end();
    if !prompt_re().is_match(tail) {
        return false;
    }
    match base {
        Some(base) => tail.starts_with(base),
        None => true,
    }
}

fn last_line(buf: &str) -> &str {
    let trimmed = buf.trim_end_matches(['\r', '\n', ' ']);
    trimmed.rsplit(['\n', '\r']).next().unwrap_or(trimmed)
}

fn strip_echo_and_prompt(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if !lines.is_empty() {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| prompt_re().is_match(l.trim_end())) {
        lines.pop();
    }
    lines.join("\n")
}
