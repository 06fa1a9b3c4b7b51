// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account row CRUD and counter updates.

use courier_core::{AccountStatus, CourierError};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::AccountRecord;

const COLUMNS: &str = "phone, api_id, api_hash, proxy, status, user_id, username, \
                       error_count, last_error, created_at, updated_at, last_activity, \
                       daily_count, last_reset_date";

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRecord> {
    let status: String = row.get(4)?;
    Ok(AccountRecord {
        phone: row.get(0)?,
        api_id: row.get(1)?,
        api_hash: row.get(2)?,
        proxy: row.get(3)?,
        status: super::parse_enum(4, &status)?,
        user_id: row.get(5)?,
        username: row.get(6)?,
        error_count: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        last_activity: row.get(11)?,
        daily_count: row.get(12)?,
        last_reset_date: row.get(13)?,
    })
}

/// Insert a new account row.
pub async fn insert_account(db: &Database, account: &AccountRecord) -> Result<(), CourierError> {
    let account = account.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO accounts (phone, api_id, api_hash, proxy, status, user_id, \
                 username, error_count, last_error, created_at, updated_at, last_activity, \
                 daily_count, last_reset_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    account.phone,
                    account.api_id,
                    account.api_hash,
                    account.proxy,
                    account.status.to_string(),
                    account.user_id,
                    account.username,
                    account.error_count,
                    account.last_error,
                    account.created_at,
                    account.updated_at,
                    account.last_activity,
                    account.daily_count,
                    account.last_reset_date,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get an account by phone number.
pub async fn get_account(db: &Database, phone: &str) -> Result<Option<AccountRecord>, CourierError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM accounts WHERE phone = ?1"))?;
            let result = stmt.query_row(params![phone], row_to_account);
            match result {
                Ok(account) => Ok(Some(account)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List all accounts, oldest first.
pub async fn list_accounts(db: &Database) -> Result<Vec<AccountRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM accounts ORDER BY created_at"))?;
            let rows = stmt.query_map([], row_to_account)?;
            let mut accounts = Vec::new();
            for row in rows {
                accounts.push(row?);
            }
            Ok(accounts)
        })
        .await
        .map_err(map_tr_err)
}

/// Update an account's lifecycle status.
pub async fn update_status(
    db: &Database,
    phone: &str,
    status: AccountStatus,
) -> Result<(), CourierError> {
    let phone = phone.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET status = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE phone = ?2",
                params![status, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the network identity learned after authorization.
pub async fn update_identity(
    db: &Database,
    phone: &str,
    user_id: i64,
    username: Option<&str>,
) -> Result<(), CourierError> {
    let phone = phone.to_string();
    let username = username.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET user_id = ?1, username = ?2, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE phone = ?3",
                params![user_id, username, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Increment the error counter and store the latest error text.
pub async fn record_error(db: &Database, phone: &str, message: &str) -> Result<(), CourierError> {
    let phone = phone.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET error_count = error_count + 1, last_error = ?1, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE phone = ?2",
                params![message, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reset the error counter after a successful operation.
pub async fn clear_error(db: &Database, phone: &str) -> Result<(), CourierError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET error_count = 0, last_error = NULL, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE phone = ?1",
                params![phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist usage-tracking fields after selection or a daily reset.
pub async fn update_usage(
    db: &Database,
    phone: &str,
    daily_count: i64,
    last_activity: Option<&str>,
    last_reset_date: &str,
) -> Result<(), CourierError> {
    let phone = phone.to_string();
    let last_activity = last_activity.map(str::to_string);
    let last_reset_date = last_reset_date.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET daily_count = ?1, last_activity = ?2, \
                 last_reset_date = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                 WHERE phone = ?4",
                params![daily_count, last_activity, last_reset_date, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete an account row. Returns whether a row was removed.
pub async fn delete_account(db: &Database, phone: &str) -> Result<bool, CourierError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM accounts WHERE phone = ?1", params![phone])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::now_rfc3339;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_account(phone: &str) -> AccountRecord {
        let now = now_rfc3339();
        AccountRecord {
            phone: phone.to_string(),
            api_id: 12345,
            api_hash: "abcdef0123456789".to_string(),
            proxy: None,
            status: AccountStatus::PendingCode,
            user_id: None,
            username: None,
            error_count: 0,
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
            last_activity: None,
            daily_count: 0,
            last_reset_date: "2026-01-01".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let account = make_account("+15550000001");

        insert_account(&db, &account).await.unwrap();
        let got = get_account(&db, "+15550000001").await.unwrap().unwrap();
        assert_eq!(got.phone, "+15550000001");
        assert_eq!(got.status, AccountStatus::PendingCode);
        assert_eq!(got.api_id, 12345);
        assert_eq!(got.daily_count, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_account_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_account(&db, "+19990000000").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected() {
        let (db, _dir) = setup_db().await;
        let account = make_account("+15550000002");
        insert_account(&db, &account).await.unwrap();
        assert!(insert_account(&db, &account).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_update_persists() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000003")).await.unwrap();

        update_status(&db, "+15550000003", AccountStatus::Active)
            .await
            .unwrap();
        let got = get_account(&db, "+15550000003").await.unwrap().unwrap();
        assert_eq!(got.status, AccountStatus::Active);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn error_counter_increments_and_clears() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000004")).await.unwrap();

        record_error(&db, "+15550000004", "timeout").await.unwrap();
        record_error(&db, "+15550000004", "rpc error").await.unwrap();
        let got = get_account(&db, "+15550000004").await.unwrap().unwrap();
        assert_eq!(got.error_count, 2);
        assert_eq!(got.last_error.as_deref(), Some("rpc error"));

        clear_error(&db, "+15550000004").await.unwrap();
        let got = get_account(&db, "+15550000004").await.unwrap().unwrap();
        assert_eq!(got.error_count, 0);
        assert!(got.last_error.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn usage_fields_persist() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000005")).await.unwrap();

        let activity = now_rfc3339();
        update_usage(&db, "+15550000005", 7, Some(activity.as_str()), "2026-02-02")
            .await
            .unwrap();

        let got = get_account(&db, "+15550000005").await.unwrap().unwrap();
        assert_eq!(got.daily_count, 7);
        assert_eq!(got.last_activity.as_deref(), Some(activity.as_str()));
        assert_eq!(got.last_reset_date, "2026-02-02");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn identity_update_persists() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000006")).await.unwrap();

        update_identity(&db, "+15550000006", 987654321, Some("alice"))
            .await
            .unwrap();
        let got = get_account(&db, "+15550000006").await.unwrap().unwrap();
        assert_eq!(got.user_id, Some(987654321));
        assert_eq!(got.username.as_deref(), Some("alice"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000007")).await.unwrap();

        assert!(delete_account(&db, "+15550000007").await.unwrap());
        assert!(!delete_account(&db, "+15550000007").await.unwrap());
        assert!(get_account(&db, "+15550000007").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_all_accounts() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, &make_account("+15550000008")).await.unwrap();
        insert_account(&db, &make_account("+15550000009")).await.unwrap();

        let all = list_accounts(&db).await.unwrap();
        assert_eq!(all.len(), 2);

        db.close().await.unwrap();
    }
}
