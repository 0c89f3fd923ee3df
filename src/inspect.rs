//! Observation of component lifecycles and state changes, for debugging tools.

use crate::component::InstanceId;
use tracing::debug;

/// Receives lifecycle and state events from a [`Scheduler`](`crate::scheduler::Scheduler`).
///
/// Calls happen synchronously from within render passes and state setters.
/// Implementations must not render or mutate state themselves.
pub trait Inspector {
	fn component_mounted(&self, id: InstanceId, name: &str);
	fn component_unmounted(&self, id: InstanceId);

	/// `value` is the [`Debug`](`core::fmt::Debug`) rendering of the new value.
	fn state_changed(&self, id: InstanceId, slot: usize, name: &str, value: &str);
}

/// Reports events as `DEBUG` level [`tracing`] events.
///
/// State values are only included with the `dangerous-logging` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInspector;

impl Inspector for TracingInspector {
	fn component_mounted(&self, id: InstanceId, name: &str) {
		debug!(?id, name, "Component mounted.")
	}

	fn component_unmounted(&self, id: InstanceId) {
		debug!(?id, "Component unmounted.")
	}

	fn state_changed(&self, id: InstanceId, slot: usize, name: &str, value: &str) {
		if cfg!(feature = "dangerous-logging") {
			debug!(?id, slot, name, value, "State changed.")
		} else {
			debug!(?id, slot, name, "State changed.")
		}
	}
}
