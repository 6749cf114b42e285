use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::mpsc;

use crate::aggregator::ResultAggregator;
use crate::geocoding::{GeocodeClient, GeocodeReply};
use crate::key_rotator::KeyRotator;
use crate::outcome::{LookupOutcome, Resolution};
use crate::source::Coordinate;

/// Fans lookups out over a fixed-size worker pool, one attempt per coordinate
pub struct LookupDispatcher<'a> {
    client: &'a dyn GeocodeClient,
    keys: &'a KeyRotator,
    pool: rayon::ThreadPool,
}

impl<'a> LookupDispatcher<'a> {
    pub fn new(client: &'a dyn GeocodeClient, keys: &'a KeyRotator, workers: usize) -> Result<Self> {
        if workers == 0 {
            anyhow::bail!("Worker count must be at least 1");
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("regeo-worker-{}", i))
            .build()
            .context("Failed to start worker pool")?;

        Ok(Self { client, keys, pool })
    }

    /// Look up every coordinate and hand each outcome to the aggregator.
    /// Workers send outcomes over a channel; the calling thread is the only writer.
    pub fn run(&self, coordinates: &[Coordinate], aggregator: &mut ResultAggregator) {
        let (tx, rx) = mpsc::channel::<LookupOutcome>();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                self.pool.install(|| {
                    coordinates.par_iter().for_each_with(tx, |tx, coordinate| {
                        // Receiver lives until every sender is dropped
                        let _ = tx.send(self.lookup(coordinate));
                    });
                });
            });

            for outcome in rx {
                aggregator.record(outcome);
            }
        });
    }

    /// Resolve a single coordinate. Never fails: every error becomes a `Resolution`.
    pub fn lookup(&self, coordinate: &Coordinate) -> LookupOutcome {
        let resolution = self.resolve(coordinate);
        let outcome = LookupOutcome::new(coordinate, resolution);
        outcome.log();
        outcome
    }

    fn resolve(&self, coordinate: &Coordinate) -> Resolution {
        let active = match self.keys.current_key() {
            Some(active) => active,
            None => return Resolution::QuotaExhausted,
        };

        match self.client.reverse_geocode(coordinate, active.key) {
            Ok(GeocodeReply::Address(address)) => Resolution::Address(address),
            Ok(GeocodeReply::NoAddress) => Resolution::AddressUnavailable,
            Ok(GeocodeReply::QuotaExceeded) => {
                if self.keys.advance_if_current(active.index) {
                    if self.keys.is_exhausted() {
                        log::error!("API key {} is over quota and no keys remain", active.index + 1);
                    } else {
                        log::warn!(
                            "API key {} is over quota, switching to key {} of {}",
                            active.index + 1,
                            active.index + 2,
                            self.keys.len()
                        );
                    }
                }
                Resolution::QuotaExhausted
            }
            Err(e) => {
                log::debug!("Row {}: {:#}", coordinate.row_index, e);
                Resolution::TransportError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed answer per row, counting calls per key
    struct ScriptedClient {
        replies: HashMap<usize, Option<GeocodeReply>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<(usize, Option<GeocodeReply>)>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                calls: Mutex::new(HashMap::new()),
            }
        }
    }

    impl GeocodeClient for ScriptedClient {
        fn reverse_geocode(&self, coordinate: &Coordinate, key: &str) -> Result<GeocodeReply> {
            *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
            match self.replies.get(&coordinate.row_index) {
                Some(Some(reply)) => Ok(reply.clone()),
                Some(None) => anyhow::bail!("connection refused"),
                None => Ok(GeocodeReply::NoAddress),
            }
        }
    }

    /// Every key is over quota
    struct QuotaClient {
        calls: AtomicUsize,
    }

    impl GeocodeClient for QuotaClient {
        fn reverse_geocode(&self, _coordinate: &Coordinate, _key: &str) -> Result<GeocodeReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeocodeReply::QuotaExceeded)
        }
    }

    /// Records the highest number of simultaneous calls
    struct InFlightClient {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GeocodeClient for InFlightClient {
        fn reverse_geocode(&self, coordinate: &Coordinate, _key: &str) -> Result<GeocodeReply> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(GeocodeReply::Address(format!("row {}", coordinate.row_index)))
        }
    }

    fn coordinates(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| Coordinate::new(i, 100.0 + i as f64, 30.0))
            .collect()
    }

    #[test]
    fn test_lookup_categories() {
        let client = ScriptedClient::new(vec![
            (7, Some(GeocodeReply::Address("123 Main St".to_string()))),
            (8, Some(GeocodeReply::NoAddress)),
            (9, None),
        ]);
        let keys = KeyRotator::new(["key1"]).unwrap();
        let dispatcher = LookupDispatcher::new(&client, &keys, 1).unwrap();

        let found = dispatcher.lookup(&Coordinate::new(7, 10.0, 20.0));
        assert_eq!(found.row_index, 7);
        assert_eq!(found.longitude, 10.0);
        assert_eq!(found.latitude, 20.0);
        assert_eq!(found.resolution, Resolution::Address("123 Main St".to_string()));

        let missing = dispatcher.lookup(&Coordinate::new(8, 1.0, 2.0));
        assert_eq!(missing.resolution, Resolution::AddressUnavailable);

        let broken = dispatcher.lookup(&Coordinate::new(9, 1.0, 2.0));
        assert_eq!(broken.resolution, Resolution::TransportError);
        assert_eq!(broken.resolution.as_str(), "network/transport error");
    }

    #[test]
    fn test_quota_rotates_without_retry() {
        let client = ScriptedClient::new(vec![(0, Some(GeocodeReply::QuotaExceeded))]);
        let keys = KeyRotator::new(["key1", "key2"]).unwrap();
        let dispatcher = LookupDispatcher::new(&client, &keys, 1).unwrap();

        let outcome = dispatcher.lookup(&Coordinate::new(0, 1.0, 2.0));
        assert_eq!(outcome.resolution, Resolution::QuotaExhausted);
        assert_eq!(keys.current_key().unwrap().key, "key2");
        // Single attempt: the fresh key is not tried for the same row
        assert_eq!(client.calls.lock().unwrap().get("key2"), None);

        dispatcher.lookup(&Coordinate::new(1, 1.0, 2.0));
        assert_eq!(client.calls.lock().unwrap().get("key2"), Some(&1));
    }

    #[test]
    fn test_exhausted_pool_short_circuits() {
        let client = QuotaClient {
            calls: AtomicUsize::new(0),
        };
        let keys = KeyRotator::new(["a", "b", "c"]).unwrap();
        let dispatcher = LookupDispatcher::new(&client, &keys, 1).unwrap();

        let coords = coordinates(10);
        let mut aggregator = ResultAggregator::new(coords.iter().map(|c| c.row_index));
        dispatcher.run(&coords, &mut aggregator);

        // One worker: each key is burned by exactly one request, then nothing goes out
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(keys.is_exhausted());
        assert_eq!(keys.current_key(), None);

        let outcomes = aggregator.finalize().unwrap();
        assert_eq!(outcomes.len(), 10);
        assert!(outcomes
            .iter()
            .all(|o| o.resolution == Resolution::QuotaExhausted));
    }

    #[test]
    fn test_concurrent_run_records_every_row_once() {
        let replies = (0..200)
            .map(|i| {
                let reply = match i % 4 {
                    0 => Some(GeocodeReply::Address(format!("addr {}", i))),
                    1 => Some(GeocodeReply::NoAddress),
                    2 => None,
                    _ => Some(GeocodeReply::QuotaExceeded),
                };
                (i, reply)
            })
            .collect();
        let client = ScriptedClient::new(replies);
        let keys = KeyRotator::new((0..100).map(|i| format!("key{}", i))).unwrap();
        let dispatcher = LookupDispatcher::new(&client, &keys, 8).unwrap();

        let coords = coordinates(200);
        let mut aggregator = ResultAggregator::new(coords.iter().map(|c| c.row_index));
        dispatcher.run(&coords, &mut aggregator);

        let outcomes = aggregator.finalize().unwrap();
        assert_eq!(outcomes.len(), 200);
        let rows: HashSet<usize> = outcomes.iter().map(|o| o.row_index).collect();
        assert_eq!(rows.len(), 200);

        for outcome in &outcomes {
            if outcome.row_index % 4 == 0 {
                assert_eq!(
                    outcome.resolution,
                    Resolution::Address(format!("addr {}", outcome.row_index))
                );
            }
        }

        // 50 quota replies can never advance the cursor more than 50 times
        let advanced = keys.current_key().map(|k| k.index).unwrap_or(keys.len());
        assert!(advanced >= 1 && advanced <= 50);
    }

    #[test]
    fn test_in_flight_lookups_bounded_by_workers() {
        let client = InFlightClient {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let keys = KeyRotator::new(["key1"]).unwrap();
        let dispatcher = LookupDispatcher::new(&client, &keys, 3).unwrap();

        let coords = coordinates(60);
        let mut aggregator = ResultAggregator::new(coords.iter().map(|c| c.row_index));
        dispatcher.run(&coords, &mut aggregator);

        let peak = client.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak in flight was {}", peak);
        assert_eq!(client.current.load(Ordering::SeqCst), 0);
        assert_eq!(aggregator.finalize().unwrap().len(), 60);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let client = QuotaClient {
            calls: AtomicUsize::new(0),
        };
        let keys = KeyRotator::new(["a"]).unwrap();
        assert!(LookupDispatcher::new(&client, &keys, 0).is_err());
    }
}
