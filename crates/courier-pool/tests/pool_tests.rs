// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the account pool against the mock protocol
//! collaborator: registration, sign-in, selection, supervision, removal.

use std::sync::Arc;
use std::time::Duration;

use courier_config::PoolConfig;
use courier_core::{AccountStatus, ApiCredentials, ClientError, ProtocolClient};
use courier_pool::{AccountPool, AuthOutcome, PoolError};
use courier_storage::queries::accounts;
use courier_storage::{AccountRecord, Database};
use courier_test_utils::{MockClient, MockConnector};

fn credentials() -> ApiCredentials {
    ApiCredentials {
        api_id: 12345,
        api_hash: "abcdef0123456789".to_string(),
    }
}

fn test_config() -> PoolConfig {
    PoolConfig {
        daily_limit: 3,
        error_limit: 2,
        auto_reconnect: true,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 40,
        reconnect_max_attempts: 5,
        max_flood_wait_secs: 1,
        maintenance_interval_secs: 3_600,
    }
}

struct Ctx {
    pool: Arc<AccountPool>,
    connector: Arc<MockConnector>,
    db: Arc<Database>,
    _dir: tempfile::TempDir,
}

async fn setup() -> Ctx {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.db");
    let db = Arc::new(Database::open(path.to_str().unwrap()).await.unwrap());
    let connector = MockConnector::new();
    let pool = AccountPool::new(test_config(), Arc::clone(&db), connector.clone());
    Ctx {
        pool,
        connector,
        db,
        _dir: dir,
    }
}

fn active_record(phone: &str) -> AccountRecord {
    let now = chrono::Utc::now().to_rfc3339();
    AccountRecord {
        phone: phone.to_string(),
        api_id: 12345,
        api_hash: "abcdef0123456789".to_string(),
        proxy: None,
        status: AccountStatus::Active,
        user_id: Some(1_000),
        username: Some("mock".to_string()),
        error_count: 0,
        last_error: None,
        created_at: now.clone(),
        updated_at: now,
        last_activity: None,
        daily_count: 0,
        last_reset_date: chrono::Utc::now().date_naive().to_string(),
    }
}

/// Seed a persisted active account with a ready-to-connect mock client.
async fn seed_active(ctx: &Ctx, phone: &str) -> Arc<MockClient> {
    let client = MockClient::new();
    client.set_authorized(true).await;
    ctx.connector.preset(phone, Arc::clone(&client)).await;
    accounts::insert_account(&ctx.db, &active_record(phone))
        .await
        .unwrap();
    client
}

async fn wait_until_connected(client: &MockClient) {
    for _ in 0..300 {
        if client.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client did not reconnect in time");
}

// ---- Registration and sign-in ----

#[tokio::test]
async fn register_then_complete_auth_yields_active_account() {
    let ctx = setup().await;

    ctx.pool
        .register("+15550000001", &credentials(), None)
        .await
        .unwrap();

    let client = ctx.connector.client("+15550000001").await.unwrap();
    assert!(client.code_requested().await, "code should have been requested");

    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::PendingCode);

    client.set_expected_code("12345").await;
    let outcome = ctx
        .pool
        .complete_auth("+15550000001", Some("12345"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Authorized(_)));

    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Active);
    assert_eq!(record.user_id, Some(1_000));
    assert_eq!(record.username.as_deref(), Some("mock"));

    // Persisted as well.
    let stored = accounts::get_account(&ctx.db, "+15550000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AccountStatus::Active);
}

#[tokio::test]
async fn register_rejects_invalid_phone() {
    let ctx = setup().await;
    let result = ctx.pool.register("15550000001", &credentials(), None).await;
    assert!(matches!(result, Err(PoolError::InvalidPhone { .. })));
}

#[tokio::test]
async fn register_rejects_missing_credentials() {
    let ctx = setup().await;
    let incomplete = ApiCredentials {
        api_id: 0,
        api_hash: String::new(),
    };
    let result = ctx.pool.register("+15550000001", &incomplete, None).await;
    assert!(matches!(result, Err(PoolError::MissingCredentials)));
}

#[tokio::test]
async fn register_rejects_duplicate() {
    let ctx = setup().await;
    ctx.pool
        .register("+15550000001", &credentials(), None)
        .await
        .unwrap();
    let result = ctx.pool.register("+15550000001", &credentials(), None).await;
    assert!(matches!(result, Err(PoolError::DuplicateAccount { .. })));
}

#[tokio::test]
async fn register_rejects_bad_proxy() {
    let ctx = setup().await;
    let result = ctx
        .pool
        .register("+15550000001", &credentials(), Some("nonsense"))
        .await;
    assert!(matches!(result, Err(PoolError::InvalidProxy(_))));
}

#[tokio::test]
async fn register_fails_for_already_authorized_session() {
    let ctx = setup().await;
    let client = MockClient::new();
    client.set_authorized(true).await;
    ctx.connector.preset("+15550000001", client).await;

    let result = ctx.pool.register("+15550000001", &credentials(), None).await;
    assert!(matches!(result, Err(PoolError::AlreadyAuthorized { .. })));

    // The rolled-back registration leaves no state behind.
    assert!(ctx.pool.account("+15550000001").await.is_none());
    assert!(accounts::get_account(&ctx.db, "+15550000001")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn register_surfaces_flood_wait_and_rolls_back() {
    let ctx = setup().await;
    let client = MockClient::new();
    client.set_flood_wait_on_code(60).await;
    ctx.connector.preset("+15550000001", client).await;

    let result = ctx.pool.register("+15550000001", &credentials(), None).await;
    assert!(matches!(result, Err(PoolError::RateLimited { seconds: 60 })));
    assert!(accounts::get_account(&ctx.db, "+15550000001")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn register_surfaces_banned_phone() {
    let ctx = setup().await;
    let client = MockClient::new();
    client.set_banned().await;
    ctx.connector.preset("+15550000001", client).await;

    let result = ctx.pool.register("+15550000001", &credentials(), None).await;
    assert!(matches!(result, Err(PoolError::Banned { .. })));
}

#[tokio::test]
async fn wrong_code_is_retryable() {
    let ctx = setup().await;
    ctx.pool
        .register("+15550000001", &credentials(), None)
        .await
        .unwrap();
    let client = ctx.connector.client("+15550000001").await.unwrap();
    client.set_expected_code("11111").await;

    let result = ctx
        .pool
        .complete_auth("+15550000001", Some("22222"), None)
        .await;
    assert!(matches!(result, Err(PoolError::InvalidCode)));

    // Still pending; a correct code completes the flow.
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::PendingCode);

    let outcome = ctx
        .pool
        .complete_auth("+15550000001", Some("11111"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Authorized(_)));
}

#[tokio::test]
async fn two_factor_flow() {
    let ctx = setup().await;
    ctx.pool
        .register("+15550000001", &credentials(), None)
        .await
        .unwrap();
    let client = ctx.connector.client("+15550000001").await.unwrap();
    client.set_expected_code("12345").await;
    client.set_password("hunter2").await;

    // Code alone flags the password requirement instead of failing.
    let outcome = ctx
        .pool
        .complete_auth("+15550000001", Some("12345"), None)
        .await
        .unwrap();
    assert_eq!(outcome, AuthOutcome::TwoFactorRequired);
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::PendingTwoFactor);

    // Wrong password is retryable.
    let result = ctx
        .pool
        .complete_auth("+15550000001", None, Some("wrong"))
        .await;
    assert!(matches!(result, Err(PoolError::InvalidPassword)));

    let outcome = ctx
        .pool
        .complete_auth("+15550000001", None, Some("hunter2"))
        .await
        .unwrap();
    assert!(matches!(outcome, AuthOutcome::Authorized(_)));
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Active);
}

#[tokio::test]
async fn complete_auth_without_registration_fails() {
    let ctx = setup().await;
    let result = ctx
        .pool
        .complete_auth("+15550000001", Some("12345"), None)
        .await;
    assert!(matches!(result, Err(PoolError::AccountNotFound { .. })));
}

// ---- Connection lifecycle ----

#[tokio::test]
async fn connect_is_idempotent() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();
    assert!(client.is_connected());

    // Second connect is a no-op success.
    ctx.pool.connect("+15550000001").await.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn disconnect_and_reconnect_cycle() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();

    ctx.pool.disconnect("+15550000001").await.unwrap();
    assert!(!client.is_connected());
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Offline);

    // Idempotent.
    ctx.pool.disconnect("+15550000001").await.unwrap();

    ctx.pool.reconnect("+15550000001").await.unwrap();
    assert!(client.is_connected());
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Active);
}

#[tokio::test]
async fn unauthorized_session_demotes_to_offline() {
    let ctx = setup().await;
    let client = MockClient::new();
    // Session exists but authorization was revoked.
    client.set_authorized(false).await;
    ctx.connector.preset("+15550000001", client).await;
    accounts::insert_account(&ctx.db, &active_record("+15550000001"))
        .await
        .unwrap();

    // Boot-time connect fails per account without failing the load.
    ctx.pool.load_persisted().await.unwrap();
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Offline);
}

#[tokio::test]
async fn repeated_connect_failures_demote_to_limited() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();

    client.drop_connection();
    client
        .fail_next_connect(ClientError::Connection("refused".to_string()))
        .await;
    client
        .fail_next_connect(ClientError::Connection("refused".to_string()))
        .await;

    // error_limit is 2: first failure -> error, second -> limited.
    let result = ctx.pool.connect("+15550000001").await;
    assert!(matches!(result, Err(PoolError::ConnectionFailed { .. })));
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Error);
    assert_eq!(record.error_count, 1);

    let result = ctx.pool.connect("+15550000001").await;
    assert!(matches!(result, Err(PoolError::ConnectionFailed { .. })));
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Limited);
    assert_eq!(record.error_count, 2);

    // A successful connect clears the error state.
    ctx.pool.connect("+15550000001").await.unwrap();
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Active);
    assert_eq!(record.error_count, 0);
}

#[tokio::test]
async fn flood_wait_on_connect_marks_status() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();

    client.drop_connection();
    client
        .fail_next_connect(ClientError::FloodWait { seconds: 30 })
        .await;

    let result = ctx.pool.connect("+15550000001").await;
    assert!(matches!(result, Err(PoolError::RateLimited { seconds: 30 })));
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::FloodWait);
}

#[tokio::test]
async fn supervisor_reconnects_after_disconnect_report() {
    let ctx = setup().await;
    ctx.pool
        .register("+15550000001", &credentials(), None)
        .await
        .unwrap();
    let client = ctx.connector.client("+15550000001").await.unwrap();
    client.set_expected_code("12345").await;
    ctx.pool
        .complete_auth("+15550000001", Some("12345"), None)
        .await
        .unwrap();
    assert!(client.is_connected());

    // Drop the transport; first reconnect attempt fails, backoff retries.
    client.drop_connection();
    client
        .fail_next_connect(ClientError::Connection("reset".to_string()))
        .await;
    ctx.pool.report_disconnect("+15550000001").await;

    wait_until_connected(&client).await;
    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Active);
}

#[tokio::test]
async fn maintenance_pass_reconnects_dropped_active_accounts() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();

    client.drop_connection();
    ctx.pool.run_maintenance().await;
    wait_until_connected(&client).await;
}

// ---- Selection ----

#[tokio::test]
async fn get_available_resets_counter_once_per_day() {
    let ctx = setup().await;
    let _client = seed_active(&ctx, "+15550000001").await;
    // Counter exhausted yesterday.
    accounts::update_usage(&ctx.db, "+15550000001", 3, None, "2020-01-01")
        .await
        .unwrap();
    ctx.pool.load_persisted().await.unwrap();

    // Day rolled over: counter resets, account is selectable again.
    let picked = ctx.pool.get_available("forwarding").await.unwrap().unwrap();
    assert_eq!(picked.phone, "+15550000001");
    assert_eq!(picked.daily_count, 1);
    assert_eq!(
        picked.last_reset_date,
        chrono::Utc::now().date_naive().to_string()
    );

    // Same day: no second reset, counter keeps climbing to the limit.
    let picked = ctx.pool.get_available("forwarding").await.unwrap().unwrap();
    assert_eq!(picked.daily_count, 2);
    let picked = ctx.pool.get_available("forwarding").await.unwrap().unwrap();
    assert_eq!(picked.daily_count, 3);

    // Limit reached.
    assert!(ctx.pool.get_available("forwarding").await.unwrap().is_none());
}

#[tokio::test]
async fn get_available_prefers_longest_idle() {
    let ctx = setup().await;
    let _a = seed_active(&ctx, "+15550000001").await;
    let _b = seed_active(&ctx, "+15550000002").await;

    let today = chrono::Utc::now().date_naive().to_string();
    let old = (chrono::Utc::now() - chrono::Duration::hours(6)).to_rfc3339();
    let recent = (chrono::Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
    accounts::update_usage(&ctx.db, "+15550000001", 0, Some(old.as_str()), &today)
        .await
        .unwrap();
    accounts::update_usage(&ctx.db, "+15550000002", 0, Some(recent.as_str()), &today)
        .await
        .unwrap();
    ctx.pool.load_persisted().await.unwrap();

    let first = ctx.pool.get_available("forwarding").await.unwrap().unwrap();
    assert_eq!(first.phone, "+15550000001", "idle-longest account wins");

    // Selection stamped its activity; the other account is now idler.
    let second = ctx.pool.get_available("forwarding").await.unwrap().unwrap();
    assert_eq!(second.phone, "+15550000002");
}

#[tokio::test]
async fn get_available_skips_non_active_accounts() {
    let ctx = setup().await;
    let _client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();
    ctx.pool.disconnect("+15550000001").await.unwrap();

    assert!(ctx.pool.get_available("forwarding").await.unwrap().is_none());
}

// ---- Removal, report, shutdown ----

#[tokio::test]
async fn remove_deletes_row_and_session_artifact() {
    let ctx = setup().await;
    let client = seed_active(&ctx, "+15550000001").await;
    ctx.pool.load_persisted().await.unwrap();

    ctx.pool.remove("+15550000001", true).await.unwrap();

    assert!(!client.is_connected());
    assert!(ctx.pool.account("+15550000001").await.is_none());
    assert!(accounts::get_account(&ctx.db, "+15550000001")
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        ctx.connector.removed_sessions().await,
        vec!["+15550000001".to_string()]
    );
}

#[tokio::test]
async fn remove_unknown_account_fails() {
    let ctx = setup().await;
    let result = ctx.pool.remove("+15559999999", false).await;
    assert!(matches!(result, Err(PoolError::AccountNotFound { .. })));
}

#[tokio::test]
async fn load_persisted_demotes_interrupted_registrations() {
    let ctx = setup().await;
    let mut record = active_record("+15550000001");
    record.status = AccountStatus::PendingCode;
    accounts::insert_account(&ctx.db, &record).await.unwrap();

    ctx.pool.load_persisted().await.unwrap();

    let record = ctx.pool.account("+15550000001").await.unwrap();
    assert_eq!(record.status, AccountStatus::Offline);
    let stored = accounts::get_account(&ctx.db, "+15550000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AccountStatus::Offline);
}

#[tokio::test]
async fn status_report_aggregates_accounts() {
    let ctx = setup().await;
    let _a = seed_active(&ctx, "+15550000001").await;
    let _b = seed_active(&ctx, "+15550000002").await;
    ctx.pool.load_persisted().await.unwrap();
    ctx.pool.disconnect("+15550000002").await.unwrap();
    ctx.pool.get_available("forwarding").await.unwrap().unwrap();

    let report = ctx.pool.status_report().await;
    assert_eq!(report.total_accounts, 2);
    assert_eq!(report.by_status.get("active"), Some(&1));
    assert_eq!(report.by_status.get("offline"), Some(&1));
    assert_eq!(report.daily_limit, 3);
    assert_eq!(report.total_used_today, 1);
    assert_eq!(report.total_remaining, 5);
    assert_eq!(report.capacity_used_percent, 16); // 1 of 6 slots
    assert_eq!(report.accounts.len(), 2);
    let active_entry = report
        .accounts
        .iter()
        .find(|a| a.phone == "+15550000001")
        .unwrap();
    assert!(active_entry.connected);
    assert_eq!(active_entry.remaining, 2);
}

#[tokio::test]
async fn shutdown_disconnects_every_handle() {
    let ctx = setup().await;
    let a = seed_active(&ctx, "+15550000001").await;
    let b = seed_active(&ctx, "+15550000002").await;
    ctx.pool.load_persisted().await.unwrap();
    assert!(a.is_connected());
    assert!(b.is_connected());

    ctx.pool.shutdown().await;

    assert!(!a.is_connected());
    assert!(!b.is_connected());
}
