use futures_util::stream::{self, Stream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BridgeSynchronizer, MentionSuggestion, SearchHit};
use crate::config::SyncConfig;
use crate::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(Vec<SearchHit>),
    /// A newer query was issued before this one answered
    Superseded,
}

/// Mention-menu query stream with a latest-wins guard
///
/// Every issued query takes a monotonically increasing token. A response is
/// only delivered if its token is still the latest once the bridge answers.
/// A host that does not answer within the search timeout yields a bridge
/// error.
pub struct SearchSession {
    bridge: BridgeSynchronizer,
    trigger: char,
    timeout: Duration,
    latest: AtomicU64,
}

impl SearchSession {
    pub fn new(bridge: BridgeSynchronizer, config: &SyncConfig) -> Self {
        Self {
            bridge,
            trigger: config.mention_trigger,
            timeout: config.search_timeout(),
            latest: AtomicU64::new(0),
        }
    }

    /// Token of the most recently issued query
    pub fn latest_token(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    pub async fn search(&self, raw_query: &str) -> SyncResult<SearchOutcome> {
        let token = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let query = raw_query.strip_prefix(self.trigger).unwrap_or(raw_query);

        let result = match tokio::time::timeout(self.timeout, self.bridge.search(query)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Host did not answer search '{}' within {:?}", query, self.timeout);
                Err(SyncError::Bridge {
                    operation: "search",
                    message: format!("no answer within {:?}", self.timeout),
                })
            }
        };

        if self.latest.load(Ordering::Acquire) != token {
            debug!("Discarding superseded search #{} for '{}'", token, query);
            return Ok(SearchOutcome::Superseded);
        }

        result.map(SearchOutcome::Results)
    }

    /// Suggestions for the mention menu, yielded one at a time
    ///
    /// `None` when the query was superseded.
    pub async fn suggestions(
        &self,
        raw_query: &str,
    ) -> SyncResult<Option<impl Stream<Item = MentionSuggestion>>> {
        match self.search(raw_query).await? {
            SearchOutcome::Results(hits) => Ok(Some(stream::iter(
                hits.into_iter().map(MentionSuggestion::from),
            ))),
            SearchOutcome::Superseded => Ok(None),
        }
    }
}
