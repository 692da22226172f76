//! TOML configuration.
//!
//! Every section is optional and every field has a default, so an empty
//! file is a valid config. Secrets never live here: the OpenAI key comes
//! from `OPENAI_API_KEY` and the mailbox password from the environment
//! variable named by `mailbox.password_env`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use replydesk_core::compose::ReplyStyle;
use replydesk_core::eligibility::{
    default_auto_submitted_values, default_blocked_senders, default_blocked_subject_keywords,
    EligibilityRules,
};
use replydesk_core::normalize::NormalizeOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

// ============ Paths ============

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_corpus_path")]
    pub corpus: PathBuf,
    #[serde(default = "default_knowledge_base_path")]
    pub knowledge_base: PathBuf,
    #[serde(default = "default_index_path")]
    pub index: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus: default_corpus_path(),
            knowledge_base: default_knowledge_base_path(),
            index: default_index_path(),
        }
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("data/emails.txt")
}
fn default_knowledge_base_path() -> PathBuf {
    PathBuf::from("data/knowledge_base.json")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("data/index.sqlite")
}

// ============ Corpus ============

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_separator_char")]
    pub separator_char: char,
    #[serde(default = "default_separator_min_run")]
    pub separator_min_run: usize,
    #[serde(default = "default_min_block_chars")]
    pub min_block_chars: usize,
    #[serde(default = "default_boilerplate")]
    pub boilerplate: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            separator_char: default_separator_char(),
            separator_min_run: default_separator_min_run(),
            min_block_chars: default_min_block_chars(),
            boilerplate: default_boilerplate(),
        }
    }
}

impl CorpusConfig {
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            separator_char: self.separator_char,
            separator_min_run: self.separator_min_run,
            min_block_chars: self.min_block_chars,
            boilerplate: self.boilerplate.clone(),
        }
    }
}

fn default_separator_char() -> char {
    '*'
}
fn default_separator_min_run() -> usize {
    10
}
fn default_min_block_chars() -> usize {
    10
}
fn default_boilerplate() -> Vec<String> {
    NormalizeOptions::default().boilerplate
}

// ============ Embedding ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

// ============ Retrieval ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    2
}

// ============ Generation ============

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            url: None,
            max_retries: default_generation_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_generation_max_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

// ============ Reply ============

#[derive(Debug, Deserialize, Clone)]
pub struct ReplyConfig {
    #[serde(default = "default_company")]
    pub company: String,
    #[serde(default = "default_opening_line")]
    pub opening_line: String,
    #[serde(default = "default_sign_off")]
    pub sign_off: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Send [`SENTINEL_REPLY`](replydesk_core::compose::SENTINEL_REPLY) when
    /// generation fails instead of skipping the message.
    #[serde(default)]
    pub send_on_generation_failure: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            company: default_company(),
            opening_line: default_opening_line(),
            sign_off: default_sign_off(),
            subject_prefix: default_subject_prefix(),
            send_on_generation_failure: false,
        }
    }
}

impl ReplyConfig {
    pub fn style(&self) -> ReplyStyle {
        ReplyStyle {
            company: self.company.clone(),
            opening_line: self.opening_line.clone(),
            sign_off: self.sign_off.clone(),
        }
    }

    /// `"Re: {subject}"`, without stacking a second prefix.
    pub fn reply_subject(&self, subject: &str) -> String {
        let subject = subject.trim();
        let prefix = self.subject_prefix.trim().to_lowercase();
        if !prefix.is_empty() && subject.to_lowercase().starts_with(&prefix) {
            subject.to_string()
        } else {
            format!("{}{}", self.subject_prefix, subject)
        }
    }
}

fn default_company() -> String {
    "Qoneqt".to_string()
}
fn default_opening_line() -> String {
    "Dear User,".to_string()
}
fn default_sign_off() -> String {
    "Thanks,\nQoneqt Support Team".to_string()
}
fn default_subject_prefix() -> String {
    "Re: ".to_string()
}

// ============ Eligibility ============

#[derive(Debug, Deserialize, Clone)]
pub struct EligibilityConfig {
    #[serde(default = "default_blocked_senders")]
    pub blocked_senders: Vec<String>,
    #[serde(default = "default_blocked_subject_keywords")]
    pub blocked_subject_keywords: Vec<String>,
    #[serde(default = "default_auto_submitted_values")]
    pub auto_submitted_values: Vec<String>,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            blocked_senders: default_blocked_senders(),
            blocked_subject_keywords: default_blocked_subject_keywords(),
            auto_submitted_values: default_auto_submitted_values(),
        }
    }
}

impl EligibilityConfig {
    /// The one rule set shared by the mailbox pre-filter and the session loop.
    pub fn rules(&self) -> EligibilityRules {
        EligibilityRules::new(
            self.blocked_senders.clone(),
            self.blocked_subject_keywords.clone(),
            self.auto_submitted_values.clone(),
        )
    }
}

// ============ Mailbox ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Tls,
    Starttls,
    Plaintext,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    #[serde(default)]
    pub imap_host: Option<String>,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default = "default_imap_tls")]
    pub tls: TlsMode,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: TlsMode,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Login name; falls back to `IMAP_USER`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Sender address for replies; falls back to the username.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            imap_host: None,
            imap_port: default_imap_port(),
            tls: default_imap_tls(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_tls: default_smtp_tls(),
            folder: default_folder(),
            username: None,
            password_env: default_password_env(),
            from: None,
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

/// Mailbox settings with environment fallbacks applied.
#[derive(Clone)]
pub struct MailboxCredentials {
    pub imap_host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("imap_host", &self.imap_host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl MailboxConfig {
    /// Resolve host, username and password, consulting `IMAP_HOST`,
    /// `IMAP_USER` and `password_env`.
    pub fn credentials(&self) -> Result<MailboxCredentials> {
        let imap_host = match &self.imap_host {
            Some(host) => host.clone(),
            None => std::env::var("IMAP_HOST")
                .context("mailbox.imap_host not set and IMAP_HOST is missing")?,
        };
        let username = match &self.username {
            Some(user) => user.clone(),
            None => std::env::var("IMAP_USER")
                .context("mailbox.username not set and IMAP_USER is missing")?,
        };
        let password = std::env::var(&self.password_env).with_context(|| {
            format!(
                "mailbox password missing: environment variable {} is not set",
                self.password_env
            )
        })?;
        let from = self.from.clone().unwrap_or_else(|| username.clone());
        Ok(MailboxCredentials {
            imap_host,
            username,
            password,
            from,
        })
    }
}

fn default_imap_port() -> u16 {
    993
}
fn default_imap_tls() -> TlsMode {
    TlsMode::Tls
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_tls() -> TlsMode {
    TlsMode::Starttls
}
fn default_folder() -> String {
    "INBOX".to_string()
}
fn default_password_env() -> String {
    "IMAP_PASS".to_string()
}
fn default_io_timeout_secs() -> u64 {
    30
}

// ============ Session ============

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_empty_inbox_secs")]
    pub empty_inbox_secs: u64,
    #[serde(default = "default_skip_pause_secs")]
    pub skip_pause_secs: u64,
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,
    #[serde(default = "default_after_send_secs")]
    pub after_send_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            error_backoff_secs: default_error_backoff_secs(),
            empty_inbox_secs: default_empty_inbox_secs(),
            skip_pause_secs: default_skip_pause_secs(),
            throttle_secs: default_throttle_secs(),
            after_send_secs: default_after_send_secs(),
        }
    }
}

impl SessionConfig {
    pub fn timings(&self) -> crate::session::SessionTimings {
        crate::session::SessionTimings {
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            empty_inbox: Duration::from_secs(self.empty_inbox_secs),
            skip_pause: Duration::from_secs(self.skip_pause_secs),
            throttle: Duration::from_secs(self.throttle_secs),
            after_send: Duration::from_secs(self.after_send_secs),
        }
    }
}

fn default_error_backoff_secs() -> u64 {
    10
}
fn default_empty_inbox_secs() -> u64 {
    15
}
fn default_skip_pause_secs() -> u64 {
    5
}
fn default_throttle_secs() -> u64 {
    20
}
fn default_after_send_secs() -> u64 {
    5
}

// ============ Loading ============

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Corpus
    if config.corpus.separator_min_run == 0 {
        bail!("corpus.separator_min_run must be > 0");
    }
    if config.corpus.separator_char.is_whitespace() {
        bail!("corpus.separator_char must not be whitespace");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    // Reply
    if config.reply.opening_line.trim().is_empty() {
        bail!("reply.opening_line must not be empty");
    }
    if config.reply.sign_off.trim().is_empty() {
        bail!("reply.sign_off must not be empty");
    }

    // Session
    if config.session.empty_inbox_secs <= config.session.error_backoff_secs {
        bail!(
            "session.empty_inbox_secs ({}) must be greater than session.error_backoff_secs ({})",
            config.session.empty_inbox_secs,
            config.session.error_backoff_secs
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.retrieval.top_k, 2);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.mailbox.smtp_host, "smtp.gmail.com");
        assert_eq!(config.mailbox.smtp_port, 587);
        assert_eq!(config.mailbox.tls, TlsMode::Tls);
        assert_eq!(config.mailbox.smtp_tls, TlsMode::Starttls);
        assert_eq!(config.session.error_backoff_secs, 10);
        assert_eq!(config.session.empty_inbox_secs, 15);
        assert_eq!(config.session.throttle_secs, 20);
        assert_eq!(config.reply.sign_off, "Thanks,\nQoneqt Support Team");
        assert!(!config.reply.send_on_generation_failure);
    }

    #[test]
    fn test_empty_inbox_must_exceed_backoff() {
        let err = parse_config("[session]\nerror_backoff_secs = 15\nempty_inbox_secs = 15\n")
            .unwrap_err();
        assert!(err.to_string().contains("empty_inbox_secs"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        let ok = parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_reply_subject_not_double_prefixed() {
        let reply = ReplyConfig::default();
        assert_eq!(reply.reply_subject("Payment issue"), "Re: Payment issue");
        assert_eq!(reply.reply_subject("RE: Payment issue"), "RE: Payment issue");
        assert_eq!(reply.reply_subject("  Refund "), "Re: Refund");
    }

    #[test]
    fn test_eligibility_overrides() {
        let config = parse_config(
            "[eligibility]\nblocked_senders = [\"Billing@\"]\nblocked_subject_keywords = []\n",
        )
        .unwrap();
        let rules = config.eligibility.rules();
        assert!(!rules.is_eligible("billing@example.com", "hello", None));
        assert!(rules.is_eligible("noreply@example.com", "newsletter", None));
        assert!(!rules.is_eligible("user@example.com", "hi", Some("auto-generated")));
    }
}
