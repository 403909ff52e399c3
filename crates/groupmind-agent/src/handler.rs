//! Message Handler: the orchestrator tying every other component together
//! into the single public operation `on_update(msg)`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use groupmind_core::error::{GroupmindError, Result};
use groupmind_core::types::{ChatId, ConversationKey, MediaDescriptor, Role, ThreadId, TurnMetadata, UserId};
use groupmind_facts::ExtractionContext;
use groupmind_resource::ResourceOptimizer;
use groupmind_storage::types::NewTurn;
use groupmind_storage::{ConversationStore, ProfileRepo};
use groupmind_telemetry::Telemetry;
use groupmind_throttle::ThrottleManager;

use crate::embedding::EmbeddingClient;
use crate::fact_queue::FactExtractionQueue;
use crate::generation::{GenerationClient, ToolExecutor};
use crate::persona::Persona;
use crate::scoped_cache::{ScopedCache, ScopedCacheEntry};
use crate::types::{Part, ToolDeclaration};

/// Upper bound on a reply before it's truncated, matching the messaging
/// platform's own text-message limit.
const PLATFORM_TEXT_LIMIT: usize = 4096;

/// How many turns `semantic_search` returns in a single recall pass.
const SEMANTIC_RECALL_LIMIT: usize = 8;

/// Notice dedupe cooldown for the fallback "temporarily unavailable" reply,
/// matching spec.md §4.1's `ttl=1800s`.
const API_LIMIT_NOTICE_TTL_SECS: i64 = 1800;
const BANNED_NOTICE_TTL_SECS: i64 = 1800;

/// A platform-agnostic inbound update. Whoever bridges the actual
/// messaging transport builds one of these per update.
#[derive(Debug, Clone)]
pub struct IncomingAuthor {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub from: Option<IncomingAuthor>,
    pub text: String,
    pub media: Vec<MediaDescriptor>,
    pub reply_to_message_id: Option<i64>,
    pub ts: i64,
}

/// The few config knobs the handler needs, read once at construction.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub max_turns: usize,
    pub retention_days: i64,
    pub base_limit_per_hour: u32,
}

pub struct MessageHandler {
    profiles: Arc<ProfileRepo>,
    conversations: Arc<ConversationStore>,
    throttle: Arc<ThrottleManager>,
    embeddings: Arc<EmbeddingClient>,
    generation: Arc<GenerationClient>,
    fact_queue: Arc<FactExtractionQueue>,
    persona: Arc<Persona>,
    scoped_cache: Arc<ScopedCache>,
    optimizer: Arc<ResourceOptimizer>,
    telemetry: Arc<Telemetry>,
    config: HandlerConfig,
    locks: DashMap<ConversationKey, Arc<AsyncMutex<()>>>,
}

impl MessageHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Arc<ProfileRepo>,
        conversations: Arc<ConversationStore>,
        throttle: Arc<ThrottleManager>,
        embeddings: Arc<EmbeddingClient>,
        generation: Arc<GenerationClient>,
        fact_queue: Arc<FactExtractionQueue>,
        persona: Arc<Persona>,
        scoped_cache: Arc<ScopedCache>,
        optimizer: Arc<ResourceOptimizer>,
        telemetry: Arc<Telemetry>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            profiles,
            conversations,
            throttle,
            embeddings,
            generation,
            fact_queue,
            persona,
            scoped_cache,
            optimizer,
            telemetry,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: ConversationKey) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.locks
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Process one inbound update. Idempotent over (chat_id, message_id):
    /// re-delivery never double-persists a turn, since `add_turn` is a
    /// no-op on conflict.
    pub async fn on_update(&self, msg: IncomingMessage) -> Result<Option<String>> {
        // Step 1: reject.
        let Some(author) = msg.from.clone() else {
            return Ok(None);
        };
        if author.is_bot {
            return Ok(None);
        }

        let key = ConversationKey::new(ChatId(msg.chat_id), msg.thread_id.map(ThreadId));

        // Step 2: ingest (always), prior to acquiring the per-key lock —
        // profile bookkeeping doesn't need conversation-order serialization.
        self.profiles.upsert_seen(
            author.user_id,
            msg.chat_id,
            author.full_name.as_deref(),
            None,
            author.username.as_deref(),
            msg.ts,
        )?;

        // Step 3: addressed?
        // Step 3 onward (including the ScopedCache push on the unaddressed
        // path) runs under the per-key lock: both are per-key mutable
        // state per §5.
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let addressed = self.is_addressed(&msg, key)?;
        if !addressed {
            self.scoped_cache.push(
                key,
                ScopedCacheEntry {
                    ts: msg.ts,
                    message_id: msg.message_id,
                    user_id: Some(author.user_id),
                    name: author.full_name.clone(),
                    username: author.username.clone(),
                    excerpt: excerpt(&msg.text),
                    text: msg.text.clone(),
                    media: msg.media.clone(),
                },
            );
            return Ok(None);
        }

        self.handle_addressed(msg, author, key).await
    }

    /// Steps 4 through 10, run under the per-key lock.
    async fn handle_addressed(
        &self,
        msg: IncomingMessage,
        author: IncomingAuthor,
        key: ConversationKey,
    ) -> Result<Option<String>> {
        let chat = ChatId(msg.chat_id);
        let user = UserId(author.user_id);

        // Step 4: ban check.
        if self.conversations.is_banned(chat, user)? {
            if self
                .conversations
                .should_send_notice(chat, user, "banned", BANNED_NOTICE_TTL_SECS, msg.ts)?
            {
                let text = self
                    .persona
                    .get_template("banned", &[("name", display_name(&author))])
                    .unwrap_or_else(|| "You are banned from this chat.".to_string());
                return Ok(Some(text));
            }
            return Ok(None);
        }

        let is_admin = self.persona.is_admin(author.user_id);

        // Step 5 + 6: quota log and throttle gate. The gate decision is
        // computed first so the single RequestHistory row already carries
        // its outcome, rather than logging once and patching it later.
        let allowed = is_admin || self.throttle.should_allow(author.user_id, self.config.base_limit_per_hour, msg.ts);
        self.throttle.record_request(author.user_id, !allowed, msg.ts)?;

        let metadata = self.build_metadata(&msg, &author, key);
        let metadata_prefix = metadata.format_prefix();
        let effective_text = effective_text(&msg.text, &msg.media);
        let incoming_embedding = self.embeddings.embed_text(&effective_text).await;
        let incoming_embedding_opt = (!incoming_embedding.is_empty()).then_some(incoming_embedding.clone());

        self.conversations.add_turn(NewTurn {
            chat_id: msg.chat_id,
            thread_id: msg.thread_id,
            message_id: msg.message_id,
            user_id: Some(author.user_id),
            role: Role::User,
            text: effective_text.clone(),
            media: msg.media.clone(),
            metadata,
            embedding: incoming_embedding_opt,
            ts: msg.ts,
            retention_days: self.config.retention_days,
        })?;

        if !allowed {
            // Turn is persisted for context coherence; no reply is emitted.
            return Ok(None);
        }

        // Step 7: assemble context.
        let mut history = self
            .conversations
            .recent(key, self.config.max_turns + 1)?;
        // Drop the turn just persisted; it's supplied separately as the
        // current user turn below.
        if matches!(history.last(), Some(t) if t.message_id == msg.message_id) {
            history.pop();
        }

        if !incoming_embedding.is_empty() && !self.optimizer.should_shed_non_essential_work() {
            let recalled = self
                .conversations
                .semantic_search(key, &incoming_embedding, SEMANTIC_RECALL_LIMIT)?;
            merge_recalled(&mut history, recalled);
        }

        // Step 8: fact extraction, fire-and-forget.
        self.fact_queue.submit(
            msg.text.clone(),
            ExtractionContext {
                chat_id: msg.chat_id,
                user_id: author.user_id,
                source_message_id: Some(msg.message_id),
            },
            msg.ts,
            &self.telemetry,
        );

        // Step 9: generate.
        let system_prompt = self.persona.get_system_prompt(msg.ts, &[]);
        let content_history = history.iter().map(turn_to_content).collect();
        let user_parts = build_user_parts(&effective_text, &msg.media, &metadata_prefix);
        let tools = vec![search_messages_tool()];
        let executor = SearchMessagesExecutor {
            conversations: Arc::clone(&self.conversations),
            embeddings: Arc::clone(&self.embeddings),
            key,
        };

        let generated = self
            .generation
            .generate(&system_prompt, content_history, user_parts, tools, Some(&executor))
            .await;

        let reply_text = match generated {
            Ok(text) => text,
            Err(GroupmindError::CircuitBreakerOpen { .. })
            | Err(GroupmindError::UpstreamTimeout { .. })
            | Err(GroupmindError::UpstreamFailure(_)) => {
                warn!(chat_id = msg.chat_id, "generation unavailable, considering fallback notice");
                if self
                    .conversations
                    .should_send_notice(chat, user, "api_limit", API_LIMIT_NOTICE_TTL_SECS, msg.ts)?
                {
                    return Ok(self
                        .persona
                        .get_template("temporarily_unavailable", &[])
                        .or(Some("I'm temporarily unavailable, try again shortly.".to_string())));
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Step 10: emit.
        let cleaned = strip_metadata_markers(&reply_text);
        let truncated = truncate_to_limit(&cleaned, PLATFORM_TEXT_LIMIT);
        if truncated.trim().is_empty() {
            let clarify = self
                .persona
                .get_template("say_it_more_clearly", &[])
                .unwrap_or_else(|| "Could you say that more clearly?".to_string());
            return Ok(Some(clarify));
        }

        let reply_embedding = self.embeddings.embed_text(&truncated).await;
        self.conversations.add_turn(NewTurn {
            chat_id: msg.chat_id,
            thread_id: msg.thread_id,
            message_id: synthetic_model_message_id(msg.message_id),
            user_id: None,
            role: Role::Model,
            text: truncated.clone(),
            media: vec![],
            metadata: TurnMetadata::default(),
            embedding: (!reply_embedding.is_empty()).then_some(reply_embedding),
            ts: msg.ts,
            retention_days: self.config.retention_days,
        })?;

        info!(chat_id = msg.chat_id, "replied to addressed message");
        Ok(Some(truncated))
    }

    /// Build the metadata header for an addressed turn, resolving the
    /// reply target from persisted history first and falling back to the
    /// `ScopedCache` when the reply points at an unaddressed message that
    /// was never persisted as a turn (spec.md §3's "fallback reply target").
    fn build_metadata(&self, msg: &IncomingMessage, author: &IncomingAuthor, key: ConversationKey) -> TurnMetadata {
        let mut metadata = TurnMetadata {
            display_name: author.full_name.clone(),
            username: author.username.clone(),
            reply_to_message_id: msg.reply_to_message_id,
            reply_to_user_id: None,
            reply_to_name: None,
            reply_to_username: None,
            reply_excerpt: None,
        };

        let Some(reply_id) = msg.reply_to_message_id else {
            return metadata;
        };

        if let Ok(Some(target)) = self.conversations.turn_by_message_id(key.chat_id, reply_id) {
            metadata.reply_to_user_id = target.user_id;
            metadata.reply_to_name = target.metadata.display_name.clone();
            metadata.reply_to_username = target.metadata.username.clone();
            metadata.reply_excerpt = Some(excerpt(&target.text));
            return metadata;
        }

        if let Some(cached) = self.scoped_cache.get(key, reply_id, msg.ts) {
            metadata.reply_to_user_id = cached.user_id;
            metadata.reply_to_name = cached.name;
            metadata.reply_to_username = cached.username;
            metadata.reply_excerpt = Some(cached.excerpt);
        }

        metadata
    }

    /// Step 3: trigger match, reply-to-prior-model-turn, or handle mention.
    fn is_addressed(&self, msg: &IncomingMessage, key: ConversationKey) -> Result<bool> {
        if self.persona.matches_trigger(&msg.text) {
            return Ok(true);
        }
        if self.persona.mentions_handle(&msg.text) {
            return Ok(true);
        }
        if let Some(reply_id) = msg.reply_to_message_id {
            if let Some(target) = self
                .conversations
                .turn_by_message_id(key.chat_id, reply_id)?
            {
                if target.role == Role::Model {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// `message_id` space is shared with the platform's own ids; model turns
/// use the negated incoming id so `UNIQUE(chat_id, message_id)` never
/// collides with a genuine platform id.
fn synthetic_model_message_id(incoming_message_id: i64) -> i64 {
    -incoming_message_id
}

fn display_name(author: &IncomingAuthor) -> &str {
    author
        .full_name
        .as_deref()
        .or(author.username.as_deref())
        .unwrap_or("there")
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        text.chars().take(MAX).collect::<String>() + "…"
    }
}

/// The text to persist and send upstream: the author's own text verbatim,
/// or an auto-generated attachment summary when the message carries media
/// but no text (spec.md §8's "empty text with media" boundary case).
fn effective_text(text: &str, media: &[MediaDescriptor]) -> String {
    if !text.trim().is_empty() || media.is_empty() {
        return text.to_string();
    }
    let kinds = media.iter().map(|m| m.label()).collect::<Vec<_>>().join(", ");
    format!("Attachments: {kinds}")
}

fn build_user_parts(text: &str, media: &[MediaDescriptor], prefix: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    if !prefix.is_empty() {
        parts.push(Part::text(prefix.to_string()));
    }
    parts.push(Part::text(text.to_string()));
    for m in media {
        parts.push(Part::text(format!("[attached: {}]", m.label())));
    }
    parts
}

fn turn_to_content(turn: &groupmind_storage::types::Turn) -> crate::types::ContentTurn {
    let role = match turn.role {
        Role::User => crate::types::GenRole::User,
        Role::Model => crate::types::GenRole::Model,
    };
    crate::types::ContentTurn::text(role, turn.text.clone())
}

/// Merge semantically recalled turns into `history`, skipping ids already
/// present and re-sorting by timestamp so the final order stays
/// chronological for the upstream model.
fn merge_recalled(history: &mut Vec<groupmind_storage::types::Turn>, recalled: Vec<groupmind_storage::types::Turn>) {
    let existing: std::collections::HashSet<i64> = history.iter().map(|t| t.id).collect();
    for turn in recalled {
        if !existing.contains(&turn.id) {
            history.push(turn);
        }
    }
    history.sort_by_key(|t| t.ts);
}

fn strip_metadata_markers(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("[meta]"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn truncate_to_limit(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

fn search_messages_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "search_messages".to_string(),
        description: "Search this conversation's history for messages semantically related to a query.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search for" },
                "limit": { "type": "integer", "description": "Maximum results", "default": SEMANTIC_RECALL_LIMIT }
            },
            "required": ["query"]
        }),
    }
}

/// Executes `search_messages` tool calls by re-entering semantic recall,
/// scoped to the same (chat, thread) as the handler's own conversation key
/// (the default `thread_only = true` per spec.md §4.2's own recall scope).
struct SearchMessagesExecutor {
    conversations: Arc<ConversationStore>,
    embeddings: Arc<EmbeddingClient>,
    key: ConversationKey,
}

#[async_trait]
impl ToolExecutor for SearchMessagesExecutor {
    async fn call(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value> {
        if name != "search_messages" {
            return Err(GroupmindError::Validation(format!("unknown tool: {name}")));
        }
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(SEMANTIC_RECALL_LIMIT);

        let query_embedding = self.embeddings.embed_text(query).await;
        if query_embedding.is_empty() {
            return Ok(serde_json::json!({ "results": [] }));
        }

        let results = self
            .conversations
            .semantic_search(self.key, &query_embedding, limit)?;
        let rendered: Vec<serde_json::Value> = results
            .into_iter()
            .map(|t| serde_json::json!({ "role": t.role.to_string(), "text": t.text, "ts": t.ts }))
            .collect();
        Ok(serde_json::json!({ "results": rendered }))
    }
}
