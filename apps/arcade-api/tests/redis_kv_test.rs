//! Token lookups against a live Redis. Skipped unless REDIS_URL is set.

use redis::AsyncCommands;

use arcade_api::auth::middleware::resolve_token;
use arcade_api::auth::tokens::access_token_key;
use arcade_api::db::kv::{KeyValueStore, RedisStore};
use arcade_common::id::prefixed_ulid;

fn redis_url() -> Option<String> {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);
    std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty())
}

#[tokio::test]
async fn token_written_by_auth_service_resolves() {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set; skipping");
        return;
    };
    let store = RedisStore::connect(&url).await.expect("connect");

    // Write the key with a plain client, as the auth service does.
    let client = redis::Client::open(url.as_str()).unwrap();
    let mut writer = client.get_multiplexed_async_connection().await.unwrap();
    let token = prefixed_ulid("tok");
    let key = access_token_key(&token);
    writer
        .set_ex::<_, _, ()>(&key, r#"{"user_id":"usr_redis"}"#, 60)
        .await
        .unwrap();

    let user = resolve_token(&store, &token).await.expect("token resolves");
    assert_eq!(user.user_id, "usr_redis");

    assert!(store.get("arcade:token:missing").await.unwrap().is_none());
    assert!(resolve_token(&store, "missing").await.is_err());

    writer.del::<_, ()>(&key).await.unwrap();
}
