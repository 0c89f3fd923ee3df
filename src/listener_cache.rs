//! Binding counts for host-side listener handles.
//!
//! A [`Surface`](`crate::surface::Surface`) that has to wrap each listener in a host object (like a JavaScript closure)
//! creates that object once per [`Listener`](`crate::node::Listener`) and shares it between all elements the listener is bound to.
//! Handles whose last binding went away stay cached until [`ListenerCache::sweep`],
//! since the reconciler unbinds and rebinds every listener of a patched element within one pass.

use core::fmt::{self, Debug, Formatter};
use hashbrown::{hash_map::Entry, HashMap};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};
use std::rc::Rc;
use thiserror::Error;

fn address<L: ?Sized>(listener: &Rc<L>) -> usize {
	Rc::as_ptr(listener).cast::<()>() as usize
}

struct Cached<V, C> {
	bindings: C,
	handle: V,
}

/// Host handles keyed by listener identity, counted per binding.
///
/// `C` bounds how many elements one listener may be bound to at once.
pub struct ListenerCache<V, C = u16> {
	entries: HashMap<usize, Cached<V, C>>,
}

impl<V, C> Default for ListenerCache<V, C> {
	fn default() -> Self {
		Self { entries: HashMap::new() }
	}
}

impl<V, C: Debug> Debug for ListenerCache<V, C> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.entries.iter().map(|(address, cached)| (address, &cached.bindings))).finish()
	}
}

impl<V, C> ListenerCache<V, C>
where
	C: CheckedAdd + CheckedSub + One + Zero,
{
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Counts one more binding of `listener`, creating its handle first if there is none.
	///
	/// # Errors
	///
	/// Iff the binding count would overflow `C`.
	pub fn bind<L: ?Sized>(&mut self, listener: &Rc<L>, create: impl FnOnce() -> V) -> Result<&V, BindingCountError> {
		match self.entries.entry(address(listener)) {
			Entry::Occupied(occupied) => {
				let cached = occupied.into_mut();
				cached.bindings = cached.bindings.checked_add(&C::one()).ok_or(BindingCountError)?;
				Ok(&cached.handle)
			}
			Entry::Vacant(vacant) => Ok(&vacant
				.insert(Cached {
					bindings: C::one(),
					handle: create(),
				})
				.handle),
		}
	}

	/// Counts one binding of `listener` less and returns its handle, which stays cached until [`ListenerCache::sweep`].
	///
	/// `Ok(None)` iff `listener` was never bound.
	///
	/// # Errors
	///
	/// Iff `listener` has no bindings left.
	pub fn unbind<L: ?Sized>(&mut self, listener: &Rc<L>) -> Result<Option<&V>, BindingCountError> {
		match self.entries.get_mut(&address(listener)) {
			Some(cached) => {
				cached.bindings = cached.bindings.checked_sub(&C::one()).ok_or(BindingCountError)?;
				Ok(Some(&cached.handle))
			}
			None => Ok(None),
		}
	}

	/// Drops the handles of all listeners without bindings, returning how many were dropped.
	pub fn sweep(&mut self) -> usize {
		self.entries.drain_filter(|_, cached| cached.bindings.is_zero()).count()
	}

	/// Number of cached handles, including unbound ones.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.entries.capacity()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("listener binding count out of range")]
pub struct BindingCountError;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		memory::{MemoryEvent, MemorySurface},
		node::Listener,
	};

	fn listener() -> Listener<MemorySurface> {
		Rc::new(|_: &MemoryEvent| ())
	}

	#[test]
	fn handles_are_shared_and_swept() {
		let mut cache = ListenerCache::<String>::new();
		let (a, b) = (listener(), listener());
		let mut created = 0;

		assert_eq!(
			cache.bind(&a, || {
				created += 1;
				"a".to_owned()
			}),
			Ok(&"a".to_owned())
		);
		cache.bind(&a, || unreachable!()).unwrap();
		cache.bind(&b, || "b".to_owned()).unwrap();
		assert_eq!(created, 1);
		assert_eq!(cache.len(), 2);

		assert_eq!(cache.unbind(&a).unwrap().map(String::as_str), Some("a"));
		assert_eq!(cache.sweep(), 0);
		cache.unbind(&a).unwrap();
		assert_eq!(cache.sweep(), 1);
		assert_eq!(cache.len(), 1);

		assert_eq!(cache.unbind(&a), Ok(None));
		cache.unbind(&b).unwrap();
		assert_eq!(cache.unbind(&b), Err(BindingCountError));
	}

	#[test]
	fn rebinding_before_a_sweep_keeps_the_handle() {
		let mut cache = ListenerCache::<usize>::new();
		let a = listener();
		cache.bind(&a, || 1).unwrap();
		cache.unbind(&a).unwrap();
		assert_eq!(cache.bind(&a, || 2), Ok(&1));
		assert_eq!(cache.sweep(), 0);
	}

	#[test]
	fn counts_saturate() {
		let mut cache = ListenerCache::<(), u8>::new();
		let a = listener();
		for _ in 0..255 {
			cache.bind(&a, || ()).unwrap();
		}
		assert_eq!(cache.bind(&a, || ()), Err(BindingCountError));
	}
}
