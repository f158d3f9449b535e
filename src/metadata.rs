//! Metadata enrichment seam.
//!
//! Concrete symbol/name/image adapters live outside the core; the pipeline
//! only defines the async source trait and the backfill pass that fills
//! placeholder tokens from whatever source is plugged in. A no-op source is
//! the default.

use crate::database::Database;
use crate::events::{DomainEvent, EventBus};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl TokenMetadata {
    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
    }
}

/// Fire-and-forget source of token descriptions. Implementations may take
/// arbitrarily long or fail; the pipeline never depends on them.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, mint: &str) -> Result<Option<TokenMetadata>>;
}

/// Default source: resolves nothing.
pub struct NoopMetadataSource;

#[async_trait]
impl MetadataSource for NoopMetadataSource {
    async fn fetch(&self, _mint: &str) -> Result<Option<TokenMetadata>> {
        Ok(None)
    }
}

/// One backfill pass: look up tokens still carrying placeholder identity,
/// ask the source, persist whatever came back. Returns how many tokens were
/// updated.
pub async fn backfill_pass(
    db: &Database,
    source: &dyn MetadataSource,
    bus: &EventBus,
    batch_size: i64,
) -> Result<usize> {
    let pending = db.placeholder_tokens(batch_size).await?;
    if pending.is_empty() {
        return Ok(0);
    }
    debug!(count = pending.len(), "metadata backfill pass");

    let mut updated = 0;
    for address in pending {
        let metadata = match source.fetch(&address).await {
            Ok(Some(metadata)) if !metadata.is_empty() => metadata,
            Ok(_) => continue,
            Err(err) => {
                warn!(token = %address, %err, "metadata fetch failed");
                continue;
            }
        };

        db.update_token_metadata(
            &address,
            metadata.symbol.as_deref(),
            metadata.name.as_deref(),
            metadata.description.as_deref(),
            metadata.image_url.as_deref(),
        )
        .await?;
        bus.publish(DomainEvent::MetadataUpdated {
            address,
            symbol: metadata.symbol,
            name: metadata.name,
            image_url: metadata.image_url,
        });
        updated += 1;
    }
    Ok(updated)
}
