//! SQLite-backed store for the government decision corpus.
//!
//! Read path only: the pipeline hands over parameterized SELECT/COUNT
//! statements and gets typed outcomes back. `seed` exists for tests and the
//! demo CLI; nothing here mutates rows on behalf of a query.

use std::path::Path;
use std::sync::Mutex;

use decision_protocol::{
    DecisionRecord, GeneratedQuery, GroupCount, QueryOutcome, ResultShape, SqlParam,
};
use rusqlite::types::Value;
use rusqlite::Connection;

mod error;

pub use error::{Result, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS israeli_government_decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    government_number INTEGER,
    decision_number TEXT NOT NULL,
    decision_date TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT,
    content TEXT,
    operativity TEXT,
    tags_policy_area TEXT,
    tags_government_body TEXT,
    prime_minister TEXT,
    decision_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_decisions_government
    ON israeli_government_decisions(government_number);
CREATE INDEX IF NOT EXISTS idx_decisions_date
    ON israeli_government_decisions(decision_date);
CREATE INDEX IF NOT EXISTS idx_decisions_number
    ON israeli_government_decisions(decision_number);
"#;

const RECORD_COLUMNS: &str = "id, government_number, decision_number, decision_date, title, \
     summary, content, operativity, tags_policy_area, tags_government_body, prime_minister, \
     decision_url";

pub struct DecisionStore {
    conn: Mutex<Connection>,
}

impl DecisionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a generated query. The statement is re-checked to be a single
    /// SELECT before it touches SQLite, independent of the generator's own
    /// guarantees.
    pub fn execute(&self, query: &GeneratedQuery) -> Result<QueryOutcome> {
        ensure_single_select(&query.statement)?;

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(&query.statement)?;
        let params = rusqlite::params_from_iter(query.params.iter().map(to_sql_value));

        match query.shape {
            ResultShape::Records => {
                let rows = stmt.query_map(params, record_from_row)?;
                let records: std::result::Result<Vec<_>, _> = rows.collect();
                Ok(QueryOutcome::Rows(records?))
            }
            ResultShape::CountScalar => {
                let count: i64 = stmt.query_row(params, |row| row.get(0))?;
                Ok(QueryOutcome::CountValue(count))
            }
            ResultShape::GroupedCount => {
                let rows = stmt.query_map(params, |row| {
                    let key: Value = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok(GroupCount {
                        key: group_key_to_string(key),
                        count,
                    })
                })?;
                let groups: std::result::Result<Vec<_>, _> = rows.collect();
                Ok(QueryOutcome::GroupedCounts(groups?))
            }
        }
    }

    /// Single-pass engine used when the template pipeline is unavailable:
    /// one disjunctive LIKE over the text columns, newest first.
    pub fn legacy_search(&self, term: &str, limit: u32) -> Result<Vec<DecisionRecord>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let statement = format!(
            "SELECT {RECORD_COLUMNS} FROM israeli_government_decisions WHERE \
             title LIKE '%' || ?1 || '%' OR content LIKE '%' || ?1 || '%' OR \
             summary LIKE '%' || ?1 || '%' OR tags_policy_area LIKE '%' || ?1 || '%' \
             ORDER BY decision_date DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&statement)?;
        let rows = stmt.query_map(
            rusqlite::params![term, i64::from(limit)],
            record_from_row,
        )?;
        let records: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(records?)
    }

    /// Cheap liveness probe.
    pub fn count_all(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count =
            conn.query_row("SELECT COUNT(*) FROM israeli_government_decisions", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    pub fn seed(&self, records: &[DecisionRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO israeli_government_decisions \
                 (government_number, decision_number, decision_date, title, summary, content, \
                  operativity, tags_policy_area, tags_government_body, prime_minister, \
                  decision_url) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.government_number,
                    record.decision_number,
                    record.decision_date,
                    record.title,
                    record.summary,
                    record.content,
                    record.operativity,
                    record.tags_policy_area,
                    record.tags_government_body,
                    record.prime_minister,
                    record.decision_url,
                ])?;
            }
        }
        tx.commit()?;
        log::info!("seeded {} decision records", records.len());
        Ok(records.len())
    }
}

fn ensure_single_select(statement: &str) -> Result<()> {
    let trimmed = statement.trim();
    let head: String = trimmed.chars().take(6).collect::<String>().to_uppercase();
    if head != "SELECT" {
        return Err(StoreError::ReadOnly {
            reason: "statement does not start with SELECT".to_string(),
        });
    }
    if trimmed.trim_end_matches(';').contains(';') {
        return Err(StoreError::ReadOnly {
            reason: "multiple statements are not allowed".to_string(),
        });
    }
    Ok(())
}

fn to_sql_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::Text(text) => Value::Text(text.clone()),
        SqlParam::Int(number) => Value::Integer(*number),
    }
}

fn group_key_to_string(key: Value) -> String {
    match key {
        Value::Integer(number) => number.to_string(),
        Value::Text(text) => text,
        Value::Null => "unknown".to_string(),
        Value::Real(number) => number.to_string(),
        Value::Blob(_) => "unknown".to_string(),
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DecisionRecord> {
    Ok(DecisionRecord {
        id: row.get(0)?,
        government_number: row.get(1)?,
        decision_number: row.get(2)?,
        decision_date: row.get(3)?,
        title: row.get(4)?,
        summary: row.get(5)?,
        content: row.get(6)?,
        operativity: row.get(7)?,
        tags_policy_area: row.get(8)?,
        tags_government_body: row.get(9)?,
        prime_minister: row.get(10)?,
        decision_url: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use decision_protocol::ResultShape;
    use pretty_assertions::assert_eq;

    fn record(
        government: i64,
        number: &str,
        date: &str,
        title: &str,
        tags: &str,
    ) -> DecisionRecord {
        DecisionRecord {
            id: 0,
            government_number: Some(government),
            decision_number: number.to_string(),
            decision_date: date.to_string(),
            title: title.to_string(),
            summary: Some(format!("תקציר: {title}")),
            content: Some(format!("תוכן ההחלטה: {title}")),
            operativity: Some("אופרטיבית".to_string()),
            tags_policy_area: Some(tags.to_string()),
            tags_government_body: Some("משרד ראש הממשלה".to_string()),
            prime_minister: Some("בנימין נתניהו".to_string()),
            decision_url: Some(format!("https://www.gov.il/he/pages/dec{number}")),
        }
    }

    fn seeded_store() -> DecisionStore {
        let store = DecisionStore::open_in_memory().unwrap();
        store
            .seed(&[
                record(37, "100", "2024-03-01", "תוכנית חומש לחינוך", "חינוך"),
                record(37, "101", "2024-05-20", "רפורמה בתחבורה הציבורית", "תחבורה"),
                record(36, "900", "2021-08-15", "חיזוק מערך האשפוז", "בריאות"),
            ])
            .unwrap();
        store
    }

    fn query(statement: &str, params: Vec<SqlParam>, shape: ResultShape) -> GeneratedQuery {
        GeneratedQuery {
            statement: statement.to_string(),
            params,
            template_id: "test".to_string(),
            shape,
            fingerprint: "test".to_string(),
        }
    }

    #[test]
    fn executes_parameterized_select() {
        let store = seeded_store();
        let q = query(
            "SELECT id, government_number, decision_number, decision_date, title, summary, \
             content, operativity, tags_policy_area, tags_government_body, prime_minister, \
             decision_url FROM israeli_government_decisions WHERE government_number = ?1 \
             ORDER BY decision_date DESC LIMIT ?2",
            vec![SqlParam::Int(37), SqlParam::Int(10)],
            ResultShape::Records,
        );
        let QueryOutcome::Rows(rows) = store.execute(&q).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
        // newest first
        assert_eq!(rows[0].decision_number, "101");
    }

    #[test]
    fn executes_count() {
        let store = seeded_store();
        let q = query(
            "SELECT COUNT(*) AS cnt FROM israeli_government_decisions WHERE government_number = ?1",
            vec![SqlParam::Int(37)],
            ResultShape::CountScalar,
        );
        assert_eq!(store.execute(&q).unwrap(), QueryOutcome::CountValue(2));
    }

    #[test]
    fn executes_grouped_count() {
        let store = seeded_store();
        let q = query(
            "SELECT government_number AS grp, COUNT(*) AS cnt FROM \
             israeli_government_decisions GROUP BY grp ORDER BY grp",
            vec![],
            ResultShape::GroupedCount,
        );
        let QueryOutcome::GroupedCounts(groups) = store.execute(&q).unwrap() else {
            panic!("expected grouped counts");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "36");
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[1].key, "37");
        assert_eq!(groups[1].count, 2);
    }

    #[test]
    fn rejects_non_select_statements() {
        let store = seeded_store();
        let q = query(
            "DELETE FROM israeli_government_decisions",
            vec![],
            ResultShape::Records,
        );
        assert!(matches!(
            store.execute(&q).unwrap_err(),
            StoreError::ReadOnly { .. }
        ));
    }

    #[test]
    fn rejects_stacked_statements() {
        let store = seeded_store();
        let q = query(
            "SELECT 1; DROP TABLE israeli_government_decisions",
            vec![],
            ResultShape::CountScalar,
        );
        assert!(matches!(
            store.execute(&q).unwrap_err(),
            StoreError::ReadOnly { .. }
        ));
    }

    #[test]
    fn legacy_search_scans_all_text_columns() {
        let store = seeded_store();
        let rows = store.legacy_search("תחבורה", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision_number, "101");

        let rows = store.legacy_search("אין כזה נושא", 10).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.db");
        {
            let store = DecisionStore::open(&path).unwrap();
            store
                .seed(&[record(37, "1", "2023-01-01", "החלטה", "חינוך")])
                .unwrap();
        }
        let store = DecisionStore::open(&path).unwrap();
        assert_eq!(store.count_all().unwrap(), 1);
    }
}
