// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding rule CRUD, checkpoint, and counter updates.

use courier_core::{CourierError, RuleStatus};
use rusqlite::params;

use crate::database::{map_tr_err, now_rfc3339, Database};
use crate::models::{NewRule, RuleRecord};

const COLUMNS: &str = "id, account_phone, source_chat_id, source_chat_name, \
                       destination_chat_ids, keywords, status, last_message_id, \
                       messages_forwarded, created_at, updated_at";

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<RuleRecord> {
    let destinations: String = row.get(4)?;
    let keywords: Option<String> = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(RuleRecord {
        id: row.get(0)?,
        account_phone: row.get(1)?,
        source_chat_id: row.get(2)?,
        source_chat_name: row.get(3)?,
        destination_chat_ids: super::parse_json(4, &destinations)?,
        keywords: match keywords {
            Some(ref raw) => Some(super::parse_json(5, raw)?),
            None => None,
        },
        status: super::parse_enum(6, &status)?,
        last_message_id: row.get(7)?,
        messages_forwarded: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Insert a new rule in status `stopped`; returns its generated id.
pub async fn insert_rule(db: &Database, rule: &NewRule) -> Result<i64, CourierError> {
    let rule = rule.clone();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let destinations = serde_json::to_string(&rule.destination_chat_ids)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            let keywords = match rule.keywords {
                Some(ref kw) => Some(
                    serde_json::to_string(kw)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
                ),
                None => None,
            };
            conn.execute(
                "INSERT INTO forwarding_rules (account_phone, source_chat_id, \
                 source_chat_name, destination_chat_ids, keywords, status, \
                 last_message_id, messages_forwarded, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?7)",
                params![
                    rule.account_phone,
                    rule.source_chat_id,
                    rule.source_chat_name,
                    destinations,
                    keywords,
                    RuleStatus::Stopped.to_string(),
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a rule by id.
pub async fn get_rule(db: &Database, id: i64) -> Result<Option<RuleRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM forwarding_rules WHERE id = ?1"))?;
            let result = stmt.query_row(params![id], row_to_rule);
            match result {
                Ok(rule) => Ok(Some(rule)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List rules, optionally scoped to one account, newest first.
pub async fn list_rules(
    db: &Database,
    account_phone: Option<&str>,
) -> Result<Vec<RuleRecord>, CourierError> {
    let account_phone = account_phone.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut rules = Vec::new();
            match &account_phone {
                Some(phone) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM forwarding_rules \
                         WHERE account_phone = ?1 ORDER BY created_at DESC, id DESC"
                    ))?;
                    let rows = stmt.query_map(params![phone], row_to_rule)?;
                    for row in rows {
                        rules.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM forwarding_rules \
                         ORDER BY created_at DESC, id DESC"
                    ))?;
                    let rows = stmt.query_map([], row_to_rule)?;
                    for row in rows {
                        rules.push(row?);
                    }
                }
            }
            Ok(rules)
        })
        .await
        .map_err(map_tr_err)
}

/// Update a rule's status.
pub async fn update_status(db: &Database, id: i64, status: RuleStatus) -> Result<(), CourierError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE forwarding_rules SET status = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance the resume checkpoint to the given source message id.
pub async fn update_checkpoint(
    db: &Database,
    id: i64,
    last_message_id: i64,
) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE forwarding_rules SET last_message_id = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![last_message_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Add to the persisted forwarded-message counter.
pub async fn add_forwarded(db: &Database, id: i64, count: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE forwarding_rules SET messages_forwarded = messages_forwarded + ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![count, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a rule row. Returns whether a row was removed.
pub async fn delete_rule(db: &Database, id: i64) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM forwarding_rules WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_rule(phone: &str) -> NewRule {
        NewRule {
            account_phone: phone.to_string(),
            source_chat_id: -100111,
            source_chat_name: "Announcements".to_string(),
            destination_chat_ids: vec![-100222, -100333],
            keywords: Some(vec!["urgent".to_string()]),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_defaults() {
        let (db, _dir) = setup_db().await;
        let id = insert_rule(&db, &make_rule("+15550000001")).await.unwrap();
        assert!(id > 0);

        let rule = get_rule(&db, id).await.unwrap().unwrap();
        assert_eq!(rule.status, RuleStatus::Stopped);
        assert_eq!(rule.last_message_id, 0);
        assert_eq!(rule.messages_forwarded, 0);
        assert_eq!(rule.destination_chat_ids, vec![-100222, -100333]);
        assert_eq!(rule.keywords.as_deref(), Some(&["urgent".to_string()][..]));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn rule_without_keywords_round_trips() {
        let (db, _dir) = setup_db().await;
        let mut new_rule = make_rule("+15550000001");
        new_rule.keywords = None;
        let id = insert_rule(&db, &new_rule).await.unwrap();

        let rule = get_rule(&db, id).await.unwrap().unwrap();
        assert!(rule.keywords.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_rule_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_rule(&db, 4242).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_account() {
        let (db, _dir) = setup_db().await;
        insert_rule(&db, &make_rule("+15550000001")).await.unwrap();
        insert_rule(&db, &make_rule("+15550000001")).await.unwrap();
        insert_rule(&db, &make_rule("+15550000002")).await.unwrap();

        let all = list_rules(&db, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let scoped = list_rules(&db, Some("+15550000001")).await.unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|r| r.account_phone == "+15550000001"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_checkpoint_and_counter_update() {
        let (db, _dir) = setup_db().await;
        let id = insert_rule(&db, &make_rule("+15550000001")).await.unwrap();

        update_status(&db, id, RuleStatus::Running).await.unwrap();
        update_checkpoint(&db, id, 512).await.unwrap();
        add_forwarded(&db, id, 2).await.unwrap();
        add_forwarded(&db, id, 1).await.unwrap();

        let rule = get_rule(&db, id).await.unwrap().unwrap();
        assert_eq!(rule.status, RuleStatus::Running);
        assert_eq!(rule.last_message_id, 512);
        assert_eq!(rule.messages_forwarded, 3);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (db, _dir) = setup_db().await;
        let id = insert_rule(&db, &make_rule("+15550000001")).await.unwrap();

        assert!(delete_rule(&db, id).await.unwrap());
        assert!(!delete_rule(&db, id).await.unwrap());
        assert!(get_rule(&db, id).await.unwrap().is_none());

        db.close().await.unwrap();
    }
}
