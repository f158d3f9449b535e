//! Lightweight Solana JSON-RPC client.
//!
//! Implements only the calls holder enumeration needs, avoiding the heavy
//! solana-client networking stack. Requests run on the blocking pool since
//! ureq is sync.

use crate::error::RpcFetchError;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::program_pack::Pack;
use spl_token::state::Account as TokenAccount;
use std::time::Duration;
use tracing::debug;

/// SPL token account data size, used as a program-accounts filter.
const TOKEN_ACCOUNT_SIZE: usize = 165;

pub struct LightRpcClient {
    url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Balances of every non-zero token account for a mint, plus the source tag
/// for the metrics row.
#[derive(Debug, Clone)]
pub struct MintHolders {
    pub balances: Vec<u64>,
    pub source: &'static str,
}

impl LightRpcClient {
    pub fn new(url: String, timeout_secs: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(timeout_secs))
            .build();
        Self { url, agent }
    }

    async fn call<T>(&self, method: &'static str, params: Value) -> Result<T, RpcFetchError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!(method, "rpc call");

        let agent = self.agent.clone();
        let url = self.url.clone();
        let body = request_body.to_string();

        let response_body = tokio::task::spawn_blocking(move || -> Result<String, RpcFetchError> {
            let response = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&body)
                .map_err(map_ureq_error)?;
            response
                .into_string()
                .map_err(|e| RpcFetchError::Transport(e.to_string()))
        })
        .await
        .map_err(|e| RpcFetchError::Transport(e.to_string()))??;

        let parsed: RpcResponse<T> = serde_json::from_str(&response_body)
            .map_err(|e| RpcFetchError::Malformed(e.to_string()))?;

        if let Some(error) = parsed.error {
            if error.code == 429 {
                return Err(RpcFetchError::RateLimited);
            }
            return Err(RpcFetchError::Node {
                code: error.code,
                message: error.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| RpcFetchError::Malformed("no result in rpc response".to_string()))
    }

    /// All non-zero token-account balances for a mint, largest source first:
    /// a full program-accounts scan, falling back to the top-20
    /// largest-accounts call when the scan is refused.
    pub async fn mint_holders(&self, mint: &str) -> Result<MintHolders, RpcFetchError> {
        match self.token_accounts_by_mint(mint).await {
            Ok(balances) => Ok(MintHolders {
                balances,
                source: "program_accounts",
            }),
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                debug!(%err, mint, "program accounts scan refused, using largest accounts");
                let balances = self.token_largest_accounts(mint).await?;
                Ok(MintHolders {
                    balances,
                    source: "largest_accounts",
                })
            }
        }
    }

    async fn token_accounts_by_mint(&self, mint: &str) -> Result<Vec<u64>, RpcFetchError> {
        let params = json!([
            spl_token::id().to_string(),
            {
                "encoding": "base64",
                "commitment": "confirmed",
                "filters": [
                    { "dataSize": TOKEN_ACCOUNT_SIZE },
                    { "memcmp": { "offset": 0, "bytes": mint } }
                ]
            }
        ]);

        let accounts: Vec<Value> = self.call("getProgramAccounts", params).await?;

        let mut balances = Vec::with_capacity(accounts.len());
        for entry in accounts {
            let Some(data_str) = entry["account"]["data"][0].as_str() else {
                continue;
            };
            let data = base64::engine::general_purpose::STANDARD
                .decode(data_str)
                .map_err(|e| RpcFetchError::Malformed(e.to_string()))?;
            let account = TokenAccount::unpack_from_slice(&data)
                .map_err(|e| RpcFetchError::Malformed(e.to_string()))?;
            if account.amount > 0 {
                balances.push(account.amount);
            }
        }
        Ok(balances)
    }

    async fn token_largest_accounts(&self, mint: &str) -> Result<Vec<u64>, RpcFetchError> {
        let params = json!([mint, { "commitment": "confirmed" }]);
        let response: Value = self.call("getTokenLargestAccounts", params).await?;

        let entries = response["value"]
            .as_array()
            .ok_or_else(|| RpcFetchError::Malformed("value is not an array".to_string()))?;

        let mut balances = Vec::with_capacity(entries.len());
        for entry in entries {
            let amount: u64 = entry["amount"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| RpcFetchError::Malformed("amount is not a u64".to_string()))?;
            if amount > 0 {
                balances.push(amount);
            }
        }
        Ok(balances)
    }
}

fn map_ureq_error(err: ureq::Error) -> RpcFetchError {
    match err {
        ureq::Error::Status(429, _) => RpcFetchError::RateLimited,
        ureq::Error::Status(code, _) => RpcFetchError::Node {
            code: code as i64,
            message: format!("http status {code}"),
        },
        ureq::Error::Transport(t) => {
            let text = t.to_string();
            if text.contains("timed out") {
                RpcFetchError::Timeout
            } else {
                RpcFetchError::Transport(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_maps_to_rate_limited() {
        let err = map_ureq_error(ureq::Error::Status(
            429,
            ureq::Response::new(429, "Too Many Requests", "").unwrap(),
        ));
        assert!(matches!(err, RpcFetchError::RateLimited));
        assert!(err.is_transient());
    }

    #[test]
    fn other_statuses_are_not_transient() {
        let err = map_ureq_error(ureq::Error::Status(
            500,
            ureq::Response::new(500, "Internal Server Error", "").unwrap(),
        ));
        assert!(matches!(err, RpcFetchError::Node { code: 500, .. }));
        assert!(!err.is_transient());
    }
}
