use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concordia_core::{LearnedRule, LearningStore, RuleChange, RuleOrigin, StoreError};
use sqlx::{Sqlite, Transaction as SqlTransaction};

use crate::db::{corrupt, unavailable, DbPool};

type RuleRow = (String, String, String, f64, i64, String, bool, String, Option<String>);

const RULE_COLUMNS: &str =
    "pattern, match_type, account_code, confidence, usage_count, origin, active, created_at, last_used_at";

/// SQLite-backed [`LearningStore`]. Read-modify-write cycles run inside a
/// database transaction so concurrent confirmations of one pattern land on
/// a single row.
#[derive(Debug, Clone)]
pub struct SqliteLearningStore {
    pool: DbPool,
}

fn parse_time(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(column, e))
}

fn rule_from_row(r: RuleRow) -> Result<LearnedRule, StoreError> {
    Ok(LearnedRule {
        pattern: r.0,
        match_type: r.1.parse().map_err(|e: String| corrupt("match_type", e))?,
        account_code: r.2,
        confidence: r.3 as f32,
        usage_count: u32::try_from(r.4).map_err(|e| corrupt("usage_count", e))?,
        origin: r.5.parse::<RuleOrigin>().map_err(|e| corrupt("origin", e))?,
        active: r.6,
        created_at: parse_time("created_at", &r.7)?,
        last_used_at: r.8.as_deref().map(|t| parse_time("last_used_at", t)).transpose()?,
    })
}

impl SqliteLearningStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<SqlTransaction<'static, Sqlite>, StoreError> {
        self.pool.begin().await.map_err(unavailable)
    }

    async fn fetch(tx: &mut SqlTransaction<'static, Sqlite>, pattern: &str) -> Result<Option<LearnedRule>, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM learned_rules WHERE pattern = ?"
        ))
        .bind(pattern)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unavailable)?;
        row.map(rule_from_row).transpose()
    }

    async fn write(tx: &mut SqlTransaction<'static, Sqlite>, rule: &LearnedRule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO learned_rules (pattern, match_type, account_code, confidence, usage_count,
                origin, active, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (pattern) DO UPDATE SET
                match_type = excluded.match_type,
                account_code = excluded.account_code,
                confidence = excluded.confidence,
                usage_count = excluded.usage_count,
                origin = excluded.origin,
                active = excluded.active,
                last_used_at = excluded.last_used_at
            "#,
        )
        .bind(&rule.pattern)
        .bind(rule.match_type.to_string())
        .bind(&rule.account_code)
        .bind(f64::from(rule.confidence))
        .bind(i64::from(rule.usage_count))
        .bind(rule.origin.to_string())
        .bind(rule.active)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.last_used_at.map(|t| t.to_rfc3339()))
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl LearningStore for SqliteLearningStore {
    async fn get_rule(&self, pattern: &str) -> Result<Option<LearnedRule>, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM learned_rules WHERE pattern = ?"
        ))
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        row.map(rule_from_row).transpose()
    }

    async fn active_rules(&self) -> Result<Vec<LearnedRule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM learned_rules WHERE active = 1 ORDER BY pattern"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.into_iter().map(rule_from_row).collect()
    }

    async fn record_confirmation(
        &self,
        pattern: &str,
        account_code: &str,
        origin: RuleOrigin,
        now: DateTime<Utc>,
    ) -> Result<(RuleChange, LearnedRule), StoreError> {
        let mut tx = self.begin().await?;
        let (change, rule) = match Self::fetch(&mut tx, pattern).await? {
            Some(mut rule) => {
                let change = rule.confirm(account_code, origin, now);
                (change, rule)
            }
            None => (RuleChange::Created, LearnedRule::new(pattern, account_code, origin, now)),
        };
        Self::write(&mut tx, &rule).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok((change, rule))
    }

    async fn record_use(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<LearnedRule>, StoreError> {
        let mut tx = self.begin().await?;
        let Some(mut rule) = Self::fetch(&mut tx, pattern).await? else {
            return Ok(None);
        };
        rule.record_use(now);
        Self::write(&mut tx, &rule).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(Some(rule))
    }

    async fn deactivate(&self, pattern: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE learned_rules SET active = 0 WHERE pattern = ? AND active = 1")
            .bind(pattern)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use concordia_core::RuleMatchType;

    async fn store() -> (tempfile::TempDir, SqliteLearningStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, SqliteLearningStore::new(pool))
    }

    #[tokio::test]
    async fn confirmations_upsert_by_pattern() {
        let (_dir, store) = store().await;
        let now = Utc::now();
        let (change, rule) = store
            .record_confirmation("hetzner online gmbh", "4925", RuleOrigin::Manual, now)
            .await
            .unwrap();
        assert_eq!(change, RuleChange::Created);
        assert_eq!(rule.usage_count, 1);
        assert_eq!(rule.match_type, RuleMatchType::Contains);

        let (change, rule) = store
            .record_confirmation("hetzner online gmbh", "4925", RuleOrigin::Auto, now)
            .await
            .unwrap();
        assert_eq!(change, RuleChange::Reinforced);
        assert_eq!(rule.usage_count, 2);
        assert_eq!(rule.origin, RuleOrigin::Manual);

        let (change, rule) = store
            .record_confirmation("hetzner online gmbh", "4964", RuleOrigin::Manual, now)
            .await
            .unwrap();
        assert_eq!(change, RuleChange::Corrected);
        assert_eq!(rule.account_code, "4964");
        assert_eq!(rule.confidence, LearnedRule::INITIAL_CONFIDENCE);

        assert_eq!(store.active_rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stored_rule_matches_returned_rule() {
        let (_dir, store) = store().await;
        let (_, rule) = store
            .record_confirmation("stadtwerke musterstadt", "4240", RuleOrigin::Manual, Utc::now())
            .await
            .unwrap();
        let used = store.record_use(&rule.pattern, Utc::now()).await.unwrap().unwrap();
        assert_eq!(used.usage_count, 2);
        assert!(used.confidence > rule.confidence);

        let loaded = store.get_rule(&rule.pattern).await.unwrap().unwrap();
        assert_eq!(loaded.usage_count, used.usage_count);
        assert_eq!(loaded.account_code, "4240");
        assert!((loaded.confidence - used.confidence).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_pattern_use_is_none() {
        let (_dir, store) = store().await;
        assert!(store.record_use("nobody", Utc::now()).await.unwrap().is_none());
        assert!(!store.deactivate("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn deactivated_rules_are_kept_and_reactivated_by_confirmation() {
        let (_dir, store) = store().await;
        let now = Utc::now();
        store
            .record_confirmation("telekom deutschland", "4920", RuleOrigin::Manual, now)
            .await
            .unwrap();
        assert!(store.deactivate("telekom deutschland").await.unwrap());
        assert!(!store.deactivate("telekom deutschland").await.unwrap());
        assert!(store.active_rules().await.unwrap().is_empty());
        assert!(store.get_rule("telekom deutschland").await.unwrap().is_some());

        store
            .record_confirmation("telekom deutschland", "4920", RuleOrigin::Manual, now)
            .await
            .unwrap();
        assert_eq!(store.active_rules().await.unwrap().len(), 1);
    }
}
