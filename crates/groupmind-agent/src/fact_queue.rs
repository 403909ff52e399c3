//! Fire-and-forget fact extraction, fed by a bounded channel with a small
//! worker pool — per spec.md §9's explicit correction that an unbounded
//! queue is wrong here. A full queue drops the job and bumps a telemetry
//! counter rather than blocking the handler.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use groupmind_core::types::EntityType;
use groupmind_facts::{ExtractionContext, FactType, HybridExtractor};
use groupmind_resource::ResourceOptimizer;
use groupmind_storage::types::FactCategory;
use groupmind_storage::{FactObservation, FactsRepo};
use groupmind_telemetry::Telemetry;

/// Map a rule/model `fact_key` taxonomy value to the spec.md §3 category
/// it's stored under (`location`/`profession`/`age` → `personal`,
/// `likes`/`dislikes` → `preference`, `language`/`programming_language` →
/// `skill`). `fact_key` itself stays as the specific identity within
/// that category.
fn category_for(fact_type: FactType) -> FactCategory {
    match fact_type {
        FactType::Location | FactType::Profession | FactType::Age => FactCategory::Personal,
        FactType::Likes | FactType::Dislikes => FactCategory::Preference,
        FactType::Language | FactType::ProgrammingLanguage => FactCategory::Skill,
    }
}

const QUEUE_CAPACITY: usize = 256;
const WORKER_COUNT: usize = 2;

struct Job {
    text: String,
    ctx: ExtractionContext,
    now: i64,
}

pub struct FactExtractionQueue {
    sender: mpsc::Sender<Job>,
}

impl FactExtractionQueue {
    /// `optimizer` gates the model-based fallback: spec.md §4.6's
    /// emergency pressure level suppresses it, so every job checks
    /// `should_disable_local_model()` at process time rather than at
    /// submit time (pressure may change while a job sits in the queue).
    pub fn spawn(
        extractor: Arc<HybridExtractor>,
        facts_repo: Arc<FactsRepo>,
        telemetry: Arc<Telemetry>,
        optimizer: Arc<ResourceOptimizer>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..WORKER_COUNT {
            let rx = Arc::clone(&rx);
            let extractor = Arc::clone(&extractor);
            let facts_repo = Arc::clone(&facts_repo);
            let telemetry = Arc::clone(&telemetry);
            let optimizer = Arc::clone(&optimizer);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };
                    process_job(&extractor, &facts_repo, &telemetry, &optimizer, job).await;
                }
            });
        }

        Self { sender: tx }
    }

    /// Enqueue a fact-extraction job for `text`. Never blocks: a full
    /// queue drops the job and increments `fact_extraction.queue_dropped`.
    pub fn submit(&self, text: String, ctx: ExtractionContext, now: i64, telemetry: &Telemetry) {
        match self.sender.try_send(Job { text, ctx, now }) {
            Ok(()) => {}
            Err(_) => {
                telemetry.increment_counter("fact_extraction.queue_dropped");
                warn!("fact extraction queue full, dropping job");
            }
        }
    }
}

async fn process_job(
    extractor: &HybridExtractor,
    facts_repo: &FactsRepo,
    telemetry: &Telemetry,
    optimizer: &ResourceOptimizer,
    job: Job,
) {
    let allow_model_fallback = !optimizer.should_disable_local_model();
    let candidates = extractor.extract(&job.text, &job.ctx, allow_model_fallback).await;
    for candidate in candidates {
        let obs = FactObservation {
            entity_type: EntityType::User,
            entity_id: job.ctx.user_id,
            chat_context: Some(job.ctx.chat_id),
            fact_category: category_for(candidate.fact_type),
            fact_key: candidate.fact_key,
            fact_value: candidate.fact_value,
            fact_description: None,
            confidence: candidate.confidence,
            evidence_text: Some(candidate.evidence_text),
            source_message_id: job.ctx.source_message_id,
        };
        if let Err(e) = facts_repo.reinforce(obs, job.now) {
            warn!(error = %e, "failed to persist extracted fact");
            telemetry.increment_counter("fact_extraction.persist_error");
        } else {
            telemetry.increment_counter("fact_extraction.fact_persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupmind_storage::db;
    use std::time::Duration;

    #[tokio::test]
    async fn submitted_job_eventually_persists_a_fact() {
        let extractor = Arc::new(HybridExtractor::new(None, 0.5));
        let conn = db::open(":memory:").unwrap();
        let facts_repo = Arc::new(FactsRepo::new(conn));
        let telemetry = Arc::new(Telemetry::new());
        let optimizer = Arc::new(ResourceOptimizer::new());

        let queue = FactExtractionQueue::spawn(
            extractor,
            Arc::clone(&facts_repo),
            Arc::clone(&telemetry),
            optimizer,
        );
        queue.submit(
            "I live in Berlin and I love coffee.".to_string(),
            ExtractionContext {
                chat_id: 1,
                user_id: 7,
                source_message_id: Some(10),
            },
            1000,
            &telemetry,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        let active = facts_repo
            .active_for_entity(EntityType::User, 7, Some(1))
            .unwrap();
        assert!(!active.is_empty());
        assert!(active.iter().any(|f| f.fact_category == FactCategory::Personal && f.fact_key == "location"));
        assert!(active.iter().any(|f| f.fact_category == FactCategory::Preference && f.fact_key == "likes"));
    }

    #[test]
    fn category_for_maps_each_fact_type_to_its_spec_category() {
        assert_eq!(category_for(FactType::Location), FactCategory::Personal);
        assert_eq!(category_for(FactType::Profession), FactCategory::Personal);
        assert_eq!(category_for(FactType::Age), FactCategory::Personal);
        assert_eq!(category_for(FactType::Likes), FactCategory::Preference);
        assert_eq!(category_for(FactType::Dislikes), FactCategory::Preference);
        assert_eq!(category_for(FactType::Language), FactCategory::Skill);
        assert_eq!(category_for(FactType::ProgrammingLanguage), FactCategory::Skill);
    }
}
