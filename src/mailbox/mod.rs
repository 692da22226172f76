//! Mailbox boundary: fetch the next unread message, send a reply.
//!
//! The [`Mailbox`] trait is what the session loop talks to. Its production
//! implementation, [`ImapSmtpMailbox`], opens a fresh IMAP session per fetch
//! (connect, login, select, search `UNSEEN`, fetch the newest, logout) and a
//! fresh SMTP connection per send. Both protocols are blocking, so each call
//! runs on tokio's blocking pool.
//!
//! Fetching with `RFC822` (not `BODY.PEEK`) sets `\Seen` on the server, so a
//! message is offered at most once even if later stages fail.

mod message;

pub use message::parse_message;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox as Address;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use native_tls::TlsConnector;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use replydesk_core::eligibility::EligibilityRules;
use replydesk_core::models::{FetchOutcome, ReplyDraft};

use crate::config::{MailboxConfig, MailboxCredentials, TlsMode};

#[derive(Debug, Error)]
pub enum MailboxError {
    /// Connection, TLS, login, or protocol failure. Retried next cycle.
    #[error("mailbox transport error: {0}")]
    Transport(String),
    /// The fetched message could not be understood. It is not retried.
    #[error("could not parse message: {0}")]
    Parse(String),
    #[error("send failed: {0}")]
    Send(String),
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Open and close a session once; used as the startup check.
    async fn verify(&self) -> Result<(), MailboxError>;

    /// Fetch the newest unread message, applying the eligibility rules.
    async fn fetch_next_unread(&self) -> Result<FetchOutcome, MailboxError>;

    async fn send(&self, draft: &ReplyDraft) -> Result<(), MailboxError>;
}

/// IMAP for reading, SMTP for sending.
pub struct ImapSmtpMailbox {
    config: MailboxConfig,
    credentials: MailboxCredentials,
    rules: Arc<EligibilityRules>,
}

impl ImapSmtpMailbox {
    pub fn new(
        config: MailboxConfig,
        credentials: MailboxCredentials,
        rules: Arc<EligibilityRules>,
    ) -> Self {
        Self {
            config,
            credentials,
            rules,
        }
    }
}

#[async_trait]
impl Mailbox for ImapSmtpMailbox {
    async fn verify(&self) -> Result<(), MailboxError> {
        let config = self.config.clone();
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || {
            run_imap_task(&config, &credentials, ImapTask::Verify).map(|_| ())
        })
        .await
        .map_err(|e| MailboxError::Transport(format!("imap worker failed: {}", e)))?
    }

    async fn fetch_next_unread(&self) -> Result<FetchOutcome, MailboxError> {
        let config = self.config.clone();
        let credentials = self.credentials.clone();
        let raw = tokio::task::spawn_blocking(move || {
            run_imap_task(&config, &credentials, ImapTask::FetchLatestUnseen)
        })
        .await
        .map_err(|e| MailboxError::Transport(format!("imap worker failed: {}", e)))??;

        let Some(raw) = raw else {
            return Ok(FetchOutcome::Empty);
        };

        let message = parse_message(&raw)?;
        if let Err(rejection) = self.rules.check(
            &message.sender,
            &message.subject,
            message.auto_submitted.as_deref(),
        ) {
            return Ok(FetchOutcome::Ineligible {
                sender: message.sender,
                reason: rejection.to_string(),
            });
        }
        Ok(FetchOutcome::Message(message))
    }

    async fn send(&self, draft: &ReplyDraft) -> Result<(), MailboxError> {
        let config = self.config.clone();
        let credentials = self.credentials.clone();
        let draft = draft.clone();
        tokio::task::spawn_blocking(move || send_blocking(&config, &credentials, &draft))
            .await
            .map_err(|e| MailboxError::Send(format!("smtp worker failed: {}", e)))?
    }
}

// ============ IMAP ============

#[derive(Clone, Copy)]
enum ImapTask {
    Verify,
    FetchLatestUnseen,
}

fn transport(context: &str, err: impl std::fmt::Display) -> MailboxError {
    MailboxError::Transport(format!("{}: {}", context, err))
}

fn run_imap_task(
    config: &MailboxConfig,
    credentials: &MailboxCredentials,
    task: ImapTask,
) -> Result<Option<Vec<u8>>, MailboxError> {
    let host = credentials.imap_host.as_str();
    match config.tls {
        TlsMode::Tls => {
            let stream = connect_tcp(host, config.imap_port, config.io_timeout_secs)?;
            let tls = build_tls_connector()?;
            let stream = tls.connect(host, stream).map_err(|e| {
                transport(
                    &format!("imap tls handshake failed for '{}:{}'", host, config.imap_port),
                    e,
                )
            })?;
            in_session(greet(stream)?, credentials, &config.folder, task)
        }
        TlsMode::Starttls => {
            let stream = connect_tcp(host, config.imap_port, config.io_timeout_secs)?;
            let tls = build_tls_connector()?;
            let client = greet(stream)?
                .secure(host, &tls)
                .map_err(|e| transport("imap starttls failed", e))?;
            in_session(client, credentials, &config.folder, task)
        }
        TlsMode::Plaintext => {
            let stream = connect_tcp(host, config.imap_port, config.io_timeout_secs)?;
            in_session(greet(stream)?, credentials, &config.folder, task)
        }
    }
}

fn build_tls_connector() -> Result<TlsConnector, MailboxError> {
    TlsConnector::builder()
        .build()
        .map_err(|e| transport("tls builder failed", e))
}

/// TCP connection with read/write timeouts already applied; they cover the
/// TLS handshake and the greeting too.
fn connect_tcp(host: &str, port: u16, timeout_secs: u64) -> Result<TcpStream, MailboxError> {
    let stream = TcpStream::connect((host, port))
        .map_err(|e| transport(&format!("imap connect failed for '{}:{}'", host, port), e))?;
    let timeout = Some(Duration::from_secs(timeout_secs.max(1)));
    stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
        .map_err(|e| transport("imap socket timeout setup failed", e))?;
    Ok(stream)
}

fn greet<T: Read + Write>(stream: T) -> Result<imap::Client<T>, MailboxError> {
    let mut client = imap::Client::new(stream);
    client
        .read_greeting()
        .map_err(|e| transport("imap greeting read failed", e))?;
    Ok(client)
}

fn in_session<T: Read + Write>(
    client: imap::Client<T>,
    credentials: &MailboxCredentials,
    folder: &str,
    task: ImapTask,
) -> Result<Option<Vec<u8>>, MailboxError> {
    let mut session = client
        .login(&credentials.username, &credentials.password)
        .map_err(|(e, _)| {
            transport(
                &format!("imap login failed for '{}'", credentials.username),
                e,
            )
        })?;
    let out = perform(&mut session, folder, task);
    let _ = session.logout();
    out
}

fn perform<T: Read + Write>(
    session: &mut imap::Session<T>,
    folder: &str,
    task: ImapTask,
) -> Result<Option<Vec<u8>>, MailboxError> {
    session
        .select(folder)
        .map_err(|e| transport(&format!("imap select '{}' failed", folder), e))?;

    if let ImapTask::Verify = task {
        return Ok(None);
    }

    let unseen = session
        .search("UNSEEN")
        .map_err(|e| transport("imap search failed", e))?;
    let Some(latest) = unseen.into_iter().max() else {
        return Ok(None);
    };

    let fetches = session
        .fetch(latest.to_string(), "RFC822")
        .map_err(|e| transport("imap fetch failed", e))?;
    let fetch = fetches
        .iter()
        .next()
        .ok_or_else(|| MailboxError::Transport("imap returned empty fetch result".to_string()))?;
    let raw = fetch
        .body()
        .ok_or_else(|| MailboxError::Parse(format!("message {} has no RFC822 body", latest)))?;
    Ok(Some(raw.to_vec()))
}

// ============ SMTP ============

fn send_blocking(
    config: &MailboxConfig,
    credentials: &MailboxCredentials,
    draft: &ReplyDraft,
) -> Result<(), MailboxError> {
    let from: Address = credentials
        .from
        .parse()
        .map_err(|e| MailboxError::Send(format!("from address is invalid: {}", e)))?;
    let to: Address = draft
        .to
        .parse()
        .map_err(|e| MailboxError::Send(format!("to address '{}' is invalid: {}", draft.to, e)))?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(draft.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(draft.body.clone())
        .map_err(|e| MailboxError::Send(format!("message build failed: {}", e)))?;

    let builder = match config.smtp_tls {
        TlsMode::Plaintext => SmtpTransport::builder_dangerous(&config.smtp_host),
        TlsMode::Starttls => SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| MailboxError::Send(format!("smtp starttls relay init failed: {}", e)))?,
        TlsMode::Tls => SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| MailboxError::Send(format!("smtp tls relay init failed: {}", e)))?,
    };
    let transport = builder
        .port(config.smtp_port)
        .credentials(Credentials::new(
            credentials.username.clone(),
            credentials.password.clone(),
        ))
        .timeout(Some(Duration::from_secs(config.io_timeout_secs)))
        .build();

    transport
        .send(&message)
        .map_err(|e| MailboxError::Send(format!("smtp send to '{}' failed: {}", draft.to, e)))?;
    Ok(())
}
