//! Bounded fan-out over many independent queries.

use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};
use log::debug;

use crate::models::server::{ServerAddress, ServerInfo};
use crate::net::cancel::CancelToken;
use crate::net::discovery::DiscoveryClient;
use crate::utils::QueryError;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Runs `query` for every address with at most `limit` in flight.
///
/// Slots line up with `addresses`. Addresses never dispatched because of
/// cancellation settle as `Err(QueryError::Cancelled)`; in-flight queries are
/// dropped on cancellation, which closes their sockets. `on_settle` sees the
/// slot table after every completion.
pub async fn run_bounded<T, F, Fut>(
    addresses: &[ServerAddress],
    limit: usize,
    cancel: &CancelToken,
    mut query: F,
    mut on_settle: impl FnMut(usize, &[Option<Result<T, QueryError>>]),
) -> Vec<Result<T, QueryError>>
where
    F: FnMut(ServerAddress) -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let limit = limit.max(1);
    let mut slots: Vec<Option<Result<T, QueryError>>> =
        addresses.iter().map(|_| None).collect();
    let mut queue = addresses.iter().cloned().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut settled = 0;

    loop {
        while in_flight.len() < limit && !cancel.is_cancelled() {
            let Some((index, address)) = queue.next() else { break };
            let fut = query(address);
            let cancel = cancel.clone();
            in_flight.push(async move {
                let result = tokio::select! {
                    result = fut => result,
                    _ = cancel.cancelled() => Err(QueryError::Cancelled),
                };
                (index, result)
            });
        }

        let Some((index, result)) = in_flight.next().await else { break };
        if let Err(e) = &result {
            debug!("Query to {} failed: {}", addresses[index], e);
        }
        slots[index] = Some(result);
        settled += 1;
        on_settle(settled, &slots);
    }

    if cancel.is_cancelled() {
        debug!("Fan-out cancelled after {}/{} queries", settled, addresses.len());
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(QueryError::Cancelled)))
        .collect()
}

/// Queries game servers through a [`DiscoveryClient`] under a concurrency cap.
#[derive(Debug, Clone)]
pub struct FanOutScheduler {
    client: DiscoveryClient,
    concurrency_limit: usize,
    batch_size: usize,
}

impl FanOutScheduler {
    pub fn new(client: DiscoveryClient, concurrency_limit: usize, batch_size: usize) -> Self {
        Self {
            client,
            concurrency_limit: concurrency_limit.max(1),
            batch_size: batch_size.max(1),
        }
    }

    pub fn client(&self) -> &DiscoveryClient {
        &self.client
    }

    /// One slot per address; `None` for any failure.
    pub async fn query_all(
        &self,
        addresses: &[ServerAddress],
        cancel: &CancelToken,
        on_batch: Option<&mut (dyn FnMut(&[ServerInfo]) + Send)>,
    ) -> Vec<Option<ServerInfo>> {
        self.query_all_detailed(addresses, cancel, on_batch)
            .await
            .into_iter()
            .map(Result::ok)
            .collect()
    }

    /// Like [`query_all`](Self::query_all) but keeps each failure's classification.
    ///
    /// `on_batch` receives every responding server so far (in address order)
    /// after each `batch_size` completions, and once more with the full set.
    pub async fn query_all_detailed(
        &self,
        addresses: &[ServerAddress],
        cancel: &CancelToken,
        mut on_batch: Option<&mut (dyn FnMut(&[ServerInfo]) + Send)>,
    ) -> Vec<Result<ServerInfo, QueryError>> {
        let client = &self.client;
        let total = addresses.len();
        let batch_size = self.batch_size;

        let results = run_bounded(
            addresses,
            self.concurrency_limit,
            cancel,
            |address| async move {
                let response = client.query_game_server(&address, false, cancel).await?;
                match response.failure {
                    None => Ok(response.server),
                    Some(e) => Err(e),
                }
            },
            |settled, slots| {
                if settled % batch_size != 0 || settled == total {
                    return;
                }
                if let Some(callback) = on_batch.as_deref_mut() {
                    callback(&responded(slots.iter().flatten()));
                }
            },
        )
        .await;

        if let Some(callback) = on_batch.as_deref_mut() {
            callback(&responded(results.iter()));
        }
        results
    }

    /// Round-trip pings for every address, under the same cap.
    pub async fn ping_all(
        &self,
        addresses: &[ServerAddress],
        cancel: &CancelToken,
    ) -> Vec<Option<u64>> {
        let client = &self.client;
        run_bounded(
            addresses,
            self.concurrency_limit,
            cancel,
            |address| async move { client.ping_game_server(&address, cancel).await },
            |_, _| {},
        )
        .await
        .into_iter()
        .map(Result::ok)
        .collect()
    }
}

fn responded<'a>(
    results: impl Iterator<Item = &'a Result<ServerInfo, QueryError>>,
) -> Vec<ServerInfo> {
    results
        .filter_map(|r| r.as_ref().ok())
        .filter(|s| s.responded)
        .cloned()
        .collect()
}
