//! Single-flight leases.
//!
//! At most one builder runs per fingerprint. The first caller takes the
//! lease and dispatches; concurrent callers wait for the leader's result,
//! bounded by their own deadline, and degrade to miss handling when the
//! leader fails or the wait expires.

use crate::cache::CachedResponse;
use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// What a caller got from the flight table.
pub enum FlightWait {
    /// This caller leads; dispatch and complete (or drop) the lease.
    Lead(FlightLease),
    /// Another flight completed and shared its response.
    Shared(CachedResponse),
    /// The wait expired or the leader failed; proceed as a miss.
    Miss,
}

type FlightMap = Arc<DashMap<Fingerprint, watch::Receiver<Option<CachedResponse>>>>;

/// The single-flight table, partitioned by fingerprint.
#[derive(Default)]
pub struct SingleFlight {
    flights: FlightMap,
}

impl SingleFlight {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for a fingerprint.
    ///
    /// Returns a lease when this caller should build, or waits up to
    /// `max_wait` for the current leader's result.
    pub async fn join(&self, fingerprint: &Fingerprint, max_wait: Duration) -> FlightWait {
        let mut receiver = {
            match self.flights.entry(fingerprint.clone()) {
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    let (tx, rx) = watch::channel(None);
                    entry.insert(rx);
                    return FlightWait::Lead(FlightLease {
                        fingerprint: fingerprint.clone(),
                        flights: Arc::clone(&self.flights),
                        tx: Some(tx),
                    });
                }
                dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            }
        };

        debug!(fingerprint = %fingerprint, "Waiting on in-flight response");

        match tokio::time::timeout(max_wait, receiver.changed()).await {
            // A closed channel can still carry a response sent just before
            // the leader released the flight
            Ok(Ok(()) | Err(_)) => match receiver.borrow().clone() {
                Some(response) => FlightWait::Shared(response),
                None => FlightWait::Miss,
            },
            // The wait expired
            Err(_) => FlightWait::Miss,
        }
    }

    /// Number of in-flight builds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Whether no builds are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// The leader's handle on a flight.
///
/// Completing shares the response with every waiter. Dropping without
/// completing releases the waiters to miss handling; this is the
/// cancellation path.
pub struct FlightLease {
    fingerprint: Fingerprint,
    flights: FlightMap,
    tx: Option<watch::Sender<Option<CachedResponse>>>,
}

impl FlightLease {
    /// Share the built response with waiters and release the flight.
    pub fn complete(mut self, response: CachedResponse) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(response));
        }
        self.flights.remove(&self.fingerprint);
    }
}

impl Drop for FlightLease {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            debug!(fingerprint = %self.fingerprint, "Flight released without a response");
            self.flights.remove(&self.fingerprint);
        }
    }
}
