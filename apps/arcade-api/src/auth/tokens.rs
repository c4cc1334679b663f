//! Access tokens issued by the auth service.
//!
//! Login lives in a separate service; it writes `arcade:token:<token>` keys
//! into the shared key-value store. This service only resolves them.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Data stored alongside an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenData {
    pub user_id: String,
}

/// Key the auth service stores `token` under.
pub fn access_token_key(token: &str) -> String {
    format!("arcade:token:{}", token)
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<AccessTokenData>, ApiError> {
    match kv.get(&access_token_key(token)).await? {
        Some(v) => {
            let data: AccessTokenData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt token data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}
