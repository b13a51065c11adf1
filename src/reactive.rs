//! Dependency-tracked computations and the flush queue.
//!
//! A [`Computation`](ComputationId) records every property it reads through a [`Tracker`] during a run.
//! Changing one of those properties queues it for a re-run, which happens during [`Engine::flush`].
//! The tracker is passed explicitly to the computation body, so there is no ambient "current computation".
//!
//! Flush listeners form a second queue that is only drained once no invalidated computation is left,
//! so they observe a settled state.

use crate::{
	error::{Error, Result},
	tree::PropertyId,
	Engine,
};
use core::fmt;
use hashbrown::HashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::{instrument, trace, trace_span};

new_key_type! {
	pub struct ComputationId;
}

pub type ComputationBody = Box<dyn FnMut(&mut Engine, Tracker) -> Result<()>>;
pub type FlushListener = Box<dyn FnOnce(&mut Engine) -> Result<()>>;

/// Handed to a running computation. Reads made through [`Engine::get`] and [`Engine::has_value`] with it become dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracker(ComputationId);

impl Tracker {
	#[must_use]
	pub fn computation(self) -> ComputationId {
		self.0
	}
}

struct Computation {
	body: Option<ComputationBody>,
	dependencies: SmallVec<[PropertyId; 2]>,
	invalidated: bool,
}

#[derive(Default)]
pub struct Reactive {
	computations: SlotMap<ComputationId, Computation>,
	/// Subscribers per property, in registration order.
	subscribers: HashMap<PropertyId, SmallVec<[ComputationId; 2]>>,
	invalidated: VecDeque<ComputationId>,
	flush_listeners: VecDeque<FlushListener>,
	flushing: bool,
}

impl fmt::Debug for Reactive {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reactive")
			.field("computations", &self.computations.len())
			.field("invalidated", &self.invalidated.len())
			.field("flush_listeners", &self.flush_listeners.len())
			.field("flushing", &self.flushing)
			.finish()
	}
}

impl Reactive {
	/// Records `property` as a dependency of the tracked computation.
	pub(crate) fn track(&mut self, tracker: Tracker, property: PropertyId) {
		let computation = match self.computations.get_mut(tracker.0) {
			Some(computation) => computation,
			None => return,
		};
		if computation.dependencies.contains(&property) {
			return;
		}
		computation.dependencies.push(property);
		self.subscribers.entry(property).or_default().push(tracker.0);
	}

	/// Queues every subscriber of `property` that isn't queued yet.
	pub(crate) fn invalidate(&mut self, property: PropertyId) {
		let subscribers = match self.subscribers.get(&property) {
			Some(subscribers) => subscribers,
			None => return,
		};
		for &id in subscribers {
			if let Some(computation) = self.computations.get_mut(id) {
				if !computation.invalidated {
					computation.invalidated = true;
					self.invalidated.push_back(id);
				}
			}
		}
	}

	/// Forgets a dropped property. Computations that read it simply stop depending on it.
	pub(crate) fn forget(&mut self, property: PropertyId) {
		if let Some(subscribers) = self.subscribers.remove(&property) {
			for id in subscribers {
				if let Some(computation) = self.computations.get_mut(id) {
					computation.dependencies.retain(|dependency| *dependency != property);
				}
			}
		}
	}

	/// Idempotent. A stopped computation never runs again.
	pub(crate) fn stop(&mut self, id: ComputationId) -> bool {
		let computation = match self.computations.remove(id) {
			Some(computation) => computation,
			None => return false,
		};
		for dependency in computation.dependencies {
			self.unsubscribe(dependency, id);
		}
		true
	}

	fn unsubscribe(&mut self, property: PropertyId, id: ComputationId) {
		if let Some(subscribers) = self.subscribers.get_mut(&property) {
			subscribers.retain(|subscriber| *subscriber != id);
			if subscribers.is_empty() {
				self.subscribers.remove(&property);
			}
		}
	}

	pub(crate) fn add_flush_listener(&mut self, listener: FlushListener) {
		self.flush_listeners.push_back(listener);
	}

	#[must_use]
	pub fn is_running(&self, id: ComputationId) -> bool {
		self.computations.contains_key(id)
	}

	#[must_use]
	pub fn computation_count(&self) -> usize {
		self.computations.len()
	}

	#[must_use]
	pub fn dependency_count(&self, id: ComputationId) -> usize {
		self.computations.get(id).map_or(0, |computation| computation.dependencies.len())
	}

	#[must_use]
	pub fn is_settled(&self) -> bool {
		self.invalidated.is_empty() && self.flush_listeners.is_empty()
	}
}

impl Engine {
	/// Creates a computation and runs it once right away.
	///
	/// If that first run fails, the computation is stopped again and the error is returned.
	#[instrument(skip(self, body))]
	pub fn run_tracked(&mut self, body: impl FnMut(&mut Engine, Tracker) -> Result<()> + 'static) -> Result<ComputationId> {
		let id = self.reactive.computations.insert(Computation {
			body: Some(Box::new(body)),
			dependencies: SmallVec::new(),
			invalidated: false,
		});
		if let Err(error) = self.run_computation(id) {
			self.reactive.stop(id);
			return Err(error);
		}
		Ok(id)
	}

	/// Idempotent.
	pub fn stop(&mut self, id: ComputationId) {
		if self.reactive.stop(id) {
			trace!("Stopped computation {:?}.", id);
		}
	}

	/// Queues `listener` to run once the current batch of computation re-runs has settled.
	pub fn add_flush_listener(&mut self, listener: impl FnOnce(&mut Engine) -> Result<()> + 'static) {
		self.reactive.add_flush_listener(Box::new(listener));
	}

	/// Re-runs invalidated computations, then flush listeners, until neither is left.
	///
	/// Calling this from inside a flush is a no-op, since the outer loop picks up the new work.
	/// An error aborts the batch. Work that was still queued stays queued for the next call.
	#[instrument(skip(self))]
	pub fn flush(&mut self) -> Result<()> {
		if self.reactive.flushing {
			return Ok(());
		}
		self.reactive.flushing = true;
		let result = self.flush_queues();
		self.reactive.flushing = false;
		result
	}

	fn flush_queues(&mut self) -> Result<()> {
		let limit = self.config.flush_step_limit;
		let mut steps = 0_usize;
		loop {
			steps += 1;
			if steps > limit {
				return Err(Error::FlushLimit(limit));
			}

			if let Some(id) = self.reactive.invalidated.pop_front() {
				self.run_computation(id)?;
			} else if let Some(listener) = self.reactive.flush_listeners.pop_front() {
				let span = trace_span!("Flush listener");
				let _enter = span.enter();
				listener(self)?;
			} else {
				trace!("Flush settled after {} step(s).", steps - 1);
				return Ok(());
			}
		}
	}

	fn run_computation(&mut self, id: ComputationId) -> Result<()> {
		let computation = match self.reactive.computations.get_mut(id) {
			Some(computation) => computation,
			None => return Ok(()),
		};
		computation.invalidated = false;
		let mut body = match computation.body.take() {
			Some(body) => body,
			// Re-entrant run. The outer run collects the dependencies.
			None => return Ok(()),
		};
		let previous = core::mem::take(&mut computation.dependencies);
		for dependency in previous {
			self.reactive.unsubscribe(dependency, id);
		}

		let span = trace_span!("Computation", ?id);
		let _enter = span.enter();
		// Dependencies read before a failure stay registered, so the computation runs again once any of them changes.
		let result = body(self, Tracker(id));

		if let Some(computation) = self.reactive.computations.get_mut(id) {
			computation.body = Some(body);
		}
		result
	}
}
