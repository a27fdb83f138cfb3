// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::store::memory::MemoryStore;

fn tokens(access: Option<&str>, refresh: Option<&str>) -> ExtractedTokens {
    ExtractedTokens {
        access_token: access.map(String::from),
        refresh_token: refresh.map(String::from),
        ..Default::default()
    }
}

#[tokio::test]
async fn commit_writes_once_and_marks_authenticated() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let user = UserData { id: "1".into(), display_name: Some("ann".into()) };
    let committed = commit(
        &store,
        &ExtractedTokens { user_data: Some(user.clone()), ..tokens(Some("at"), Some("rt")) },
    )
    .await?;

    assert!(committed);
    assert_eq!(store.write_count(), 1);
    let record = CredentialRecord::load(&store).await?;
    assert!(record.authenticated);
    assert_eq!(record.access_token.as_deref(), Some("at"));
    assert_eq!(record.refresh_token.as_deref(), Some("rt"));
    assert_eq!(record.user_data, Some(user));
    Ok(())
}

#[tokio::test]
async fn commit_does_not_erase_absent_fields() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    commit(&store, &tokens(Some("old-at"), Some("old-rt"))).await?;
    commit(&store, &tokens(Some("new-at"), None)).await?;

    let record = CredentialRecord::load(&store).await?;
    assert_eq!(record.access_token.as_deref(), Some("new-at"));
    assert_eq!(record.refresh_token.as_deref(), Some("old-rt"));
    Ok(())
}

#[tokio::test]
async fn empty_extraction_writes_nothing() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    assert!(!commit(&store, &ExtractedTokens::default()).await?);
    assert_eq!(store.write_count(), 0);
    assert!(!CredentialRecord::load(&store).await?.authenticated);
    Ok(())
}

#[tokio::test]
async fn clear_removes_record_and_marker_only() -> anyhow::Result<()> {
    let mut seed = Entries::new();
    seed.insert(keys::ACCESS_TOKEN.into(), json!("at"));
    seed.insert(keys::BACKEND_TOKEN.into(), json!("bt"));
    seed.insert(keys::SESSION_MARKER.into(), json!("twitter_auth_x"));
    seed.insert(keys::PROTECTION_ENABLED.into(), json!(true));
    let store = MemoryStore::with_entries(seed);

    clear(&store).await?;

    let left = store.snapshot();
    assert_eq!(left.len(), 1);
    assert_eq!(left.get(keys::PROTECTION_ENABLED), Some(&json!(true)));
    Ok(())
}

#[tokio::test]
async fn load_ignores_malformed_user_data() -> anyhow::Result<()> {
    let mut seed = Entries::new();
    seed.insert(keys::USER_DATA.into(), json!("not an object"));
    seed.insert(keys::AUTHENTICATED.into(), json!(true));
    let store = MemoryStore::with_entries(seed);

    let record = CredentialRecord::load(&store).await?;
    assert!(record.authenticated);
    assert!(record.user_data.is_none());
    Ok(())
}
