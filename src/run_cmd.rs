//! `replydesk run` and `replydesk draft`: wire config into a session.

use anyhow::{Context, Result};
use std::sync::Arc;

use replydesk_core::compose::{GenerationResult, ReplyComposer};
use replydesk_core::index::RetrievalIndex;
use replydesk_core::store::IndexStore;

use crate::config::Config;
use crate::embedding;
use crate::generation;
use crate::knowledge_base;
use crate::mailbox::{ImapSmtpMailbox, Mailbox};
use crate::session::{self, Session, SessionContext};
use crate::sqlite_store::SqliteIndexStore;

/// Load the persisted index, warning (not failing) when it is missing,
/// stale, or built with a different embedding model.
pub async fn load_index(
    config: &Config,
    embedder: &dyn embedding::EmbeddingProvider,
) -> Option<Arc<RetrievalIndex>> {
    if !config.paths.index.exists() {
        tracing::warn!(
            path = %config.paths.index.display(),
            "no retrieval index; replies will have no policy context (run `replydesk index build`)"
        );
        return None;
    }

    let index = match read_index(config).await {
        Ok(Some(index)) => index,
        Ok(None) => {
            tracing::warn!("retrieval index is empty (run `replydesk index build`)");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "failed to load retrieval index");
            return None;
        }
    };

    if index.meta().model != embedder.model_name() {
        tracing::warn!(
            index_model = %index.meta().model,
            provider_model = embedder.model_name(),
            "index was built with a different embedding model; retrieval will be skipped"
        );
    }
    if let Ok(kb) = knowledge_base::load(&config.paths.knowledge_base) {
        if index.is_stale(&kb) {
            tracing::warn!("knowledge base changed since the index was built (run `replydesk index build`)");
        }
    }

    tracing::info!(templates = index.len(), model = %index.meta().model, "retrieval index loaded");
    Some(Arc::new(index))
}

async fn read_index(config: &Config) -> Result<Option<RetrievalIndex>> {
    let store = SqliteIndexStore::open(&config.paths.index).await?;
    let index = store.load().await;
    store.close().await;
    index
}

/// Start the mailbox session loop. Runs until Ctrl-C, or for one cycle
/// with `once`.
pub async fn run_agent(config: &Config, once: bool) -> Result<()> {
    let credentials = config.mailbox.credentials()?;
    let rules = Arc::new(config.eligibility.rules());
    let mailbox: Arc<dyn Mailbox> = Arc::new(ImapSmtpMailbox::new(
        config.mailbox.clone(),
        credentials.clone(),
        Arc::clone(&rules),
    ));

    tracing::info!(host = %credentials.imap_host, user = %credentials.username, "verifying mailbox access");
    mailbox.verify().await.with_context(|| {
        format!(
            "Could not open a mailbox session on {} as {}. Check [mailbox] settings and the {} variable.",
            credentials.imap_host, credentials.username, config.mailbox.password_env
        )
    })?;

    let embedder = embedding::create_provider(&config.embedding)?;
    let generator = generation::create_generator(&config.generation)?;
    let index = load_index(config, embedder.as_ref()).await;
    let ctx = SessionContext {
        mailbox,
        index,
        embedder,
        composer: ReplyComposer::new(generator, config.reply.style()),
        rules,
        reply: config.reply.clone(),
        top_k: config.retrieval.top_k,
        timings: config.session.timings(),
    };

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received; stopping after the current stage");
                let _ = stop_tx.send(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for Ctrl-C; stop the process to exit");
                std::future::pending::<()>().await;
            }
        }
    });
    let shutdown = async move {
        let _ = stop_rx.await;
    };

    tracing::info!(
        generator = ctx.composer.generator_model(),
        top_k = ctx.top_k,
        "session started"
    );
    let mut session = Session::new(ctx);
    let cycles = session::run_until(&mut session, shutdown, once.then_some(1)).await;
    tracing::info!(cycles, "session finished");
    Ok(())
}

/// Compose a reply to `message` without touching the mailbox.
pub async fn run_draft(config: &Config, message: &str) -> Result<()> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let generator = generation::create_generator(&config.generation)?;
    let composer = ReplyComposer::new(generator, config.reply.style());

    let context = match load_index(config, embedder.as_ref()).await {
        Some(index) => index
            .query(embedder.as_ref(), message, config.retrieval.top_k)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "retrieval failed; composing without context");
                Vec::new()
            }),
        None => Vec::new(),
    };

    println!("draft");
    println!("  context templates: {}", context.len());
    for record in &context {
        println!("    - {}", record.topic);
    }
    println!();

    let result = composer.compose(message, &context).await;
    if let GenerationResult::Failed { reason } = &result {
        eprintln!("Warning: generation failed: {}", reason);
    }
    println!("{}", result.body_or_sentinel());

    Ok(())
}
