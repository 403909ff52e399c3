use std::sync::Mutex;

use rusqlite::Connection;

use groupmind_core::error::{GroupmindError, Result};

use crate::types::{EntityType, Fact, FactCategory};

/// A fact observation proposed by the extraction pipeline, not yet merged
/// into the durable `facts` table.
#[derive(Debug, Clone)]
pub struct FactObservation {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub chat_context: Option<i64>,
    pub fact_category: FactCategory,
    pub fact_key: String,
    pub fact_value: String,
    pub fact_description: Option<String>,
    pub confidence: f64,
    pub evidence_text: Option<String>,
    pub source_message_id: Option<i64>,
}

pub struct FactsRepo {
    db: Mutex<Connection>,
}

impl FactsRepo {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Merge an observation into the `facts` table. On conflict
    /// `(entity_type, entity_id, chat_context, fact_category, fact_key)`,
    /// reinforces the existing row (bumps `evidence_count`, refreshes
    /// `last_reinforced`) rather than overwriting it, and keeps whichever
    /// confidence is higher.
    pub fn reinforce(&self, obs: FactObservation, now: i64) -> Result<Fact> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO facts
                (entity_type, entity_id, chat_context, fact_category, fact_key,
                 fact_value, fact_description, confidence, evidence_count,
                 evidence_text, source_message_id, first_observed, last_reinforced,
                 is_active, decay_rate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?11, 1, 0.0, ?11, ?11)
             ON CONFLICT(entity_type, entity_id, chat_context, fact_category, fact_key)
             DO UPDATE SET
                fact_value = excluded.fact_value,
                fact_description = excluded.fact_description,
                confidence = MAX(facts.confidence, excluded.confidence),
                evidence_count = facts.evidence_count + 1,
                evidence_text = excluded.evidence_text,
                source_message_id = excluded.source_message_id,
                last_reinforced = excluded.last_reinforced,
                is_active = 1,
                updated_at = excluded.updated_at",
            rusqlite::params![
                obs.entity_type.to_string(),
                obs.entity_id,
                obs.chat_context,
                obs.fact_category.to_string(),
                obs.fact_key,
                obs.fact_value,
                obs.fact_description,
                obs.confidence,
                obs.evidence_text,
                obs.source_message_id,
                now,
            ],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "reinforce_fact".to_string(),
            source: e,
        })?;

        db.query_row(
            "SELECT id, entity_type, entity_id, chat_context, fact_category, fact_key,
                    fact_value, fact_description, confidence, evidence_count,
                    evidence_text, source_message_id, first_observed, last_reinforced,
                    is_active, decay_rate, created_at, updated_at
             FROM facts
             WHERE entity_type = ?1 AND entity_id = ?2 AND chat_context IS ?3
               AND fact_category = ?4 AND fact_key = ?5",
            rusqlite::params![
                obs.entity_type.to_string(),
                obs.entity_id,
                obs.chat_context,
                obs.fact_category.to_string(),
                obs.fact_key,
            ],
            row_to_fact,
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "reinforce_fact_reselect".to_string(),
            source: e,
        })
    }

    /// Active facts for an entity, optionally scoped to one chat.
    pub fn active_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        chat_context: Option<i64>,
    ) -> Result<Vec<Fact>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, entity_type, entity_id, chat_context, fact_category, fact_key,
                        fact_value, fact_description, confidence, evidence_count,
                        evidence_text, source_message_id, first_observed, last_reinforced,
                        is_active, decay_rate, created_at, updated_at
                 FROM facts
                 WHERE entity_type = ?1 AND entity_id = ?2 AND chat_context IS ?3
                   AND is_active = 1
                 ORDER BY confidence DESC",
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "active_for_entity".to_string(),
                source: e,
            })?;
        let rows = stmt
            .query_map(
                rusqlite::params![entity_type.to_string(), entity_id, chat_context],
                row_to_fact,
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "active_for_entity".to_string(),
                source: e,
            })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn deactivate(&self, fact_id: i64, now: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE facts SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![fact_id, now],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "deactivate_fact".to_string(),
            source: e,
        })?;
        Ok(())
    }
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
    let entity_type_str: String = row.get(1)?;
    let category_str: String = row.get(4)?;
    Ok(Fact {
        id: row.get(0)?,
        entity_type: entity_type_str.parse().unwrap_or(EntityType::User),
        entity_id: row.get(2)?,
        chat_context: row.get(3)?,
        fact_category: category_str.parse().unwrap_or(FactCategory::Personal),
        fact_key: row.get(5)?,
        fact_value: row.get(6)?,
        fact_description: row.get(7)?,
        confidence: row.get(8)?,
        evidence_count: row.get(9)?,
        evidence_text: row.get(10)?,
        source_message_id: row.get(11)?,
        first_observed: row.get(12)?,
        last_reinforced: row.get(13)?,
        is_active: row.get::<_, i64>(14)? != 0,
        decay_rate: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(key: &str, value: &str, confidence: f64) -> FactObservation {
        FactObservation {
            entity_type: EntityType::User,
            entity_id: 7,
            chat_context: Some(1),
            fact_category: FactCategory::Personal,
            fact_key: key.to_string(),
            fact_value: value.to_string(),
            fact_description: None,
            confidence,
            evidence_text: Some("I live in Kyiv".to_string()),
            source_message_id: Some(10),
        }
    }

    #[test]
    fn reinforce_inserts_then_bumps_evidence_count() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = FactsRepo::new(conn);
        let first = repo.reinforce(obs("location", "kyiv", 0.7), 1000).unwrap();
        assert_eq!(first.evidence_count, 1);

        let second = repo.reinforce(obs("location", "kyiv", 0.9), 2000).unwrap();
        assert_eq!(second.evidence_count, 2);
        assert_eq!(second.confidence, 0.9);
        assert_eq!(second.last_reinforced, 2000);
    }

    #[test]
    fn lower_confidence_reinforcement_keeps_the_higher_value() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = FactsRepo::new(conn);
        repo.reinforce(obs("location", "kyiv", 0.9), 1000).unwrap();
        let second = repo.reinforce(obs("location", "kyiv", 0.4), 2000).unwrap();
        assert_eq!(second.confidence, 0.9);
    }

    #[test]
    fn deactivate_excludes_from_active_for_entity() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = FactsRepo::new(conn);
        let fact = repo.reinforce(obs("location", "kyiv", 0.9), 1000).unwrap();
        repo.deactivate(fact.id, 2000).unwrap();

        let active = repo
            .active_for_entity(EntityType::User, 7, Some(1))
            .unwrap();
        assert!(active.is_empty());
    }
}
