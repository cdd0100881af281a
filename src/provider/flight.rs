// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use async_lock::MutexGuard as AsyncMutexGuard;
use tokio::time;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeKey},
	error::TimeoutStage,
};

type Outcome = Option<Result<AccessToken>>;

/// Single-flight slots, one per scope key.
#[derive(Debug, Default)]
pub(crate) struct Flights(Mutex<HashMap<ScopeKey, Arc<Flight>>>);
impl Flights {
	/// Returns (and creates on demand) the flight for `key`.
	pub(crate) fn get(&self, key: &ScopeKey) -> Arc<Flight> {
		self.0.lock().entry(key.clone()).or_default().clone()
	}

	/// Returns a caller's hold on `flight`; the last holder removes the slot and its outcome.
	pub(crate) fn release(&self, key: &ScopeKey, flight: Arc<Flight>) {
		let mut flights = self.0.lock();

		drop(flight);

		if flights.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
			flights.remove(key);
		}
	}

	/// Drops every slot no caller holds; returns how many were removed.
	pub(crate) fn prune(&self) -> usize {
		let mut flights = self.0.lock();
		let before = flights.len();

		flights.retain(|_, flight| Arc::strong_count(flight) > 1);

		before - flights.len()
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.0.lock().len()
	}
}

/// Refresh slot shared by every caller of one scope key.
///
/// The lock serializes refreshes. `landed` counts published outcomes, so a caller that saw the
/// counter move while it queued knows the stored outcome was produced after it arrived.
#[derive(Debug, Default)]
pub(crate) struct Flight {
	landed: AtomicU64,
	outcome: AsyncMutex<Outcome>,
}
impl Flight {
	/// Waits for the slot until `deadline`.
	pub(crate) async fn board(&self, deadline: Instant) -> Result<Boarding<'_>> {
		let ticket = self.landed.load(Ordering::Acquire);
		let slot = time::timeout_at(deadline, self.outcome.lock())
			.await
			.map_err(|_| Error::Timeout { stage: TimeoutStage::WaitingForRefresh })?;

		let shared =
			if self.landed.load(Ordering::Acquire) != ticket { slot.as_ref().cloned() } else { None };

		if let Some(outcome) = shared {
			return Ok(Boarding::Landed(outcome));
		}

		Ok(Boarding::Pilot(Pilot { flight: self, slot }))
	}
}

/// Result of [`Flight::board`].
#[derive(Debug)]
pub(crate) enum Boarding<'a> {
	/// Another caller refreshed while this one waited; its outcome is shared.
	Landed(Result<AccessToken>),
	/// This caller holds the slot and must refresh (or find a fresh cache entry).
	Pilot(Pilot<'a>),
}

/// Exclusive hold on a [`Flight`]; dropping it without publishing releases waiters to retry.
pub(crate) struct Pilot<'a> {
	flight: &'a Flight,
	slot: AsyncMutexGuard<'a, Outcome>,
}
impl Pilot<'_> {
	/// Hands `outcome` to every caller queued behind this one.
	pub(crate) fn publish(mut self, outcome: &Result<AccessToken>) {
		*self.slot = Some(outcome.clone());

		self.flight.landed.fetch_add(1, Ordering::Release);
	}
}
impl Debug for Pilot<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Pilot(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ScopeSet;

	fn deadline() -> Instant {
		Instant::now() + std::time::Duration::from_secs(5)
	}

	#[tokio::test]
	async fn published_outcome_reaches_queued_caller() {
		let flights = Flights::default();
		let key = ScopeSet::single("https://vault.azure.net/.default")
			.expect("Vault scope should be valid.")
			.key()
			.clone();
		let flight = flights.get(&key);
		let Boarding::Pilot(pilot) = flight.board(deadline()).await.expect("Empty slot should board.")
		else {
			panic!("First caller must lead.");
		};
		let queued = flights.get(&key);
		let waiter = tokio::spawn(async move {
			match queued.board(deadline()).await.expect("Waiter should board.") {
				Boarding::Landed(outcome) => outcome.map(|token| token.expose().to_owned()),
				Boarding::Pilot(_) => panic!("Waiter must receive the published outcome."),
			}
		});

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;

		let err: Result<AccessToken> = Err(Error::Timeout { stage: TimeoutStage::Exchange });

		pilot.publish(&err);

		let shared = waiter.await.expect("Waiter task should join.");

		assert!(matches!(shared, Err(Error::Timeout { stage: TimeoutStage::Exchange })));
	}

	#[test]
	fn last_holder_removes_the_slot() {
		let flights = Flights::default();
		let key = ScopeSet::single("https://vault.azure.net/.default")
			.expect("Vault scope should be valid.")
			.key()
			.clone();
		let pilot_hold = flights.get(&key);
		let waiter_hold = flights.get(&key);

		flights.release(&key, pilot_hold);

		assert_eq!(flights.len(), 1);

		flights.release(&key, waiter_hold);

		assert_eq!(flights.len(), 0);
	}

	#[test]
	fn prune_keeps_held_slots() {
		let flights = Flights::default();
		let vault = ScopeSet::single("https://vault.azure.net/.default")
			.expect("Vault scope should be valid.");
		let graph = ScopeSet::single("https://graph.microsoft.com/.default")
			.expect("Graph scope should be valid.");
		let held = flights.get(vault.key());

		drop(flights.get(graph.key()));

		assert_eq!(flights.prune(), 1);
		assert_eq!(flights.len(), 1);

		drop(held);

		assert_eq!(flights.prune(), 1);
		assert_eq!(flights.len(), 0);
	}

	#[tokio::test]
	async fn unpublished_slot_is_led_again() {
		let flight = Flight::default();

		match flight.board(deadline()).await.expect("Slot should board.") {
			Boarding::Pilot(pilot) => drop(pilot),
			Boarding::Landed(_) => panic!("Nothing was published yet."),
		}

		assert!(matches!(
			flight.board(deadline()).await.expect("Slot should board again."),
			Boarding::Pilot(_)
		));
	}

	#[tokio::test]
	async fn waiting_is_bounded_by_deadline() {
		let flight = Flight::default();
		let _pilot = flight.board(deadline()).await.expect("Slot should board.");
		let err = flight
			.board(Instant::now() + std::time::Duration::from_millis(10))
			.await
			.expect_err("Second caller must time out while the slot is held.");

		assert!(matches!(err, Error::Timeout { stage: TimeoutStage::WaitingForRefresh }));
	}
}
