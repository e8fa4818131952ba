//! Per-key single-flight coordination.

// self
use crate::_prelude::*;

/// Runs at most one piece of work per key at a time; concurrent callers share its output.
///
/// The shared slot is an [`OnceCell`]: if the caller driving the work is cancelled, the
/// next waiting caller runs its own work instead, so a dropped leader never strands the
/// followers. Finished slots are removed, so later calls start a new flight.
pub(crate) struct FlightGroup<K, T> {
	flights: Mutex<HashMap<K, Arc<OnceCell<T>>>>,
}
impl<K, T> FlightGroup<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	pub(crate) fn new() -> Self {
		Self { flights: Mutex::new(HashMap::new()) }
	}

	pub(crate) async fn run<F, Fut>(&self, key: K, work: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let cell = self.flights.lock().entry(key.clone()).or_default().clone();
		let output = cell.get_or_init(work).await.clone();
		let mut flights = self.flights.lock();

		if flights.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
			flights.remove(&key);
		}

		output
	}

	#[cfg(test)]
	pub(crate) fn in_flight(&self) -> usize {
		self.flights.lock().len()
	}
}
impl<K, T> Debug for FlightGroup<K, T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlightGroup").field("in_flight", &self.flights.lock().len()).finish()
	}
}
