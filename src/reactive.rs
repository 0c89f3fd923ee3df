//! Observable state cells and reducer-style stores.
//!
//! Observers run synchronously, in subscription order, right after a change is stored.
//! No borrow of the value is held while they run, so observers may read (or even write) the cell again.

use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
	hash::Hash,
};
use hashbrown::HashMap;
use std::{
	cell::{Ref, RefCell},
	rc::{Rc, Weak},
};
use tracing::trace;

/// Identifies one observer of a [`State`] or [`Store`], for [unsubscribing](`State::unsubscribe`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

struct Inner<T> {
	value: RefCell<T>,
	observers: RefCell<Vec<(SubscriptionId, Rc<dyn Fn()>)>>,
	next_subscription: Cell<usize>,
}

/// A shared, observable value.
///
/// Clones refer to the same cell.
pub struct State<T>(Rc<Inner<T>>);

impl<T> Clone for State<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T: Debug> Debug for State<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self.0.value.try_borrow() {
			Ok(value) => f.debug_tuple("State").field(&*value).finish(),
			Err(_) => f.debug_tuple("State").field(&"<borrowed>").finish(),
		}
	}
}

impl<T: Default> Default for State<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T> State<T> {
	#[must_use]
	pub fn new(value: T) -> Self {
		Self(Rc::new(Inner {
			value: RefCell::new(value),
			observers: RefCell::new(Vec::new()),
			next_subscription: Cell::new(0),
		}))
	}

	/// Returns a clone of the current value.
	#[must_use]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.0.value.borrow().clone()
	}

	/// Borrows the current value.
	///
	/// # Panics
	///
	/// Iff the value is being mutated through [`State::mutate`] at the same time.
	#[must_use]
	pub fn borrow(&self) -> Ref<'_, T> {
		self.0.value.borrow()
	}

	pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
		f(&self.0.value.borrow())
	}

	/// Stores `value` and notifies observers, unless it equals the current value.
	///
	/// Returns whether the value changed.
	pub fn set(&self, value: T) -> bool
	where
		T: PartialEq,
	{
		{
			let mut current = self.0.value.borrow_mut();
			if *current == value {
				return false;
			}
			*current = value;
		}
		self.notify();
		true
	}

	/// Like [`State::set`], with the new value computed from the current one.
	pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool
	where
		T: PartialEq,
	{
		let value = self.with(f);
		self.set(value)
	}

	/// Mutates the value in place and notifies observers unconditionally.
	pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
		let result = f(&mut self.0.value.borrow_mut());
		self.notify();
		result
	}

	/// Stores `value` without notifying anyone.
	pub fn set_silently(&self, value: T) {
		*self.0.value.borrow_mut() = value
	}

	pub fn subscribe(&self, observer: impl Fn() + 'static) -> SubscriptionId {
		let id = SubscriptionId(self.0.next_subscription.get());
		self.0.next_subscription.set(id.0 + 1);
		self.0.observers.borrow_mut().push((id, Rc::new(observer)));
		id
	}

	/// Returns whether the observer was still subscribed.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut observers = self.0.observers.borrow_mut();
		let count = observers.len();
		observers.retain(|(subscription, _)| *subscription != id);
		observers.len() != count
	}

	/// Runs every observer once, in subscription order.
	///
	/// Observers added or removed while this runs take effect on the next notification.
	pub fn notify(&self) {
		let observers: Vec<_> = self.0.observers.borrow().iter().map(|(_, observer)| Rc::clone(observer)).collect();
		trace!("Notifying {} observer(s).", observers.len());
		for observer in observers {
			observer()
		}
	}

	#[must_use]
	pub fn observer_count(&self) -> usize {
		self.0.observers.borrow().len()
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakState<T> {
		WeakState(Rc::downgrade(&self.0))
	}

	/// Whether both handles refer to the same cell.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl<T> State<Vec<T>> {
	pub fn push(&self, item: T) {
		self.mutate(|items| items.push(item))
	}

	pub fn extend(&self, items: impl IntoIterator<Item = T>) {
		self.mutate(|current| current.extend(items))
	}

	/// Removes the item at `index`, if there is one.
	pub fn remove_at(&self, index: usize) -> Option<T> {
		if index >= self.len() {
			return None;
		}
		Some(self.mutate(|items| items.remove(index)))
	}

	pub fn pop(&self) -> Option<T> {
		if self.is_empty() {
			return None;
		}
		self.mutate(Vec::pop)
	}

	/// Removes the first item equal to `item`.
	pub fn remove_item(&self, item: &T) -> Option<T>
	where
		T: PartialEq,
	{
		let index = self.with(|items| items.iter().position(|i| i == item))?;
		self.remove_at(index)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.with(Vec::len)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.with(Vec::is_empty)
	}

	#[must_use]
	pub fn item(&self, index: usize) -> Option<T>
	where
		T: Clone,
	{
		self.with(|items| items.get(index).cloned())
	}
}

/// A [`State`] handle that doesn't keep the cell alive.
pub struct WeakState<T>(Weak<Inner<T>>);

impl<T> Clone for WeakState<T> {
	fn clone(&self) -> Self {
		Self(Weak::clone(&self.0))
	}
}

impl<T> WeakState<T> {
	#[must_use]
	pub fn upgrade(&self) -> Option<State<T>> {
		self.0.upgrade().map(State)
	}
}

/// A message [dispatched](`Store::dispatch`) to a [`Store`].
///
/// Handlers are looked up by [`Action::tag`], so data-carrying variants can share one handler.
pub trait Action: 'static {
	type Tag: Eq + Hash + Debug;

	fn tag(&self) -> Self::Tag;
}

type Handler<T, A> = Rc<dyn Fn(&Store<T, A>, A)>;

struct StoreInner<T, A: Action> {
	state: State<T>,
	handlers: HashMap<A::Tag, Handler<T, A>>,
}

/// A [`State`] that is changed only by handlers reacting to [`Action`]s.
pub struct Store<T, A: Action>(Rc<StoreInner<T, A>>);

impl<T, A: Action> Clone for Store<T, A> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T: Debug, A: Action> Debug for Store<T, A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Store")
			.field("state", &self.0.state)
			.field("handlers", &self.0.handlers.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl<T, A: Action> Store<T, A> {
	#[must_use]
	pub fn builder(initial: T) -> StoreBuilder<T, A> {
		StoreBuilder {
			initial,
			handlers: HashMap::new(),
		}
	}

	/// Runs the handler registered for `action`'s tag.
	///
	/// Returns `false` if there is none.
	pub fn dispatch(&self, action: A) -> bool {
		let tag = action.tag();
		match self.0.handlers.get(&tag) {
			Some(handler) => {
				let handler = Rc::clone(handler);
				trace!("Dispatching {:?}.", tag);
				handler(self, action);
				true
			}
			None => {
				trace!("No handler registered for {:?}. Ignoring the action.", tag);
				false
			}
		}
	}

	/// Replaces the state with `reducer`'s result, notifying observers if it changed.
	pub fn commit(&self, reducer: impl FnOnce(&T) -> T) -> bool
	where
		T: PartialEq,
	{
		self.0.state.update(reducer)
	}

	#[must_use]
	pub fn state(&self) -> T
	where
		T: Clone,
	{
		self.0.state.get()
	}

	pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
		self.0.state.with(f)
	}

	pub fn subscribe(&self, observer: impl Fn() + 'static) -> SubscriptionId {
		self.0.state.subscribe(observer)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.0.state.unsubscribe(id)
	}

	/// The underlying cell.
	#[must_use]
	pub fn cell(&self) -> &State<T> {
		&self.0.state
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

#[must_use]
pub struct StoreBuilder<T, A: Action> {
	initial: T,
	handlers: HashMap<A::Tag, Handler<T, A>>,
}

impl<T, A: Action> StoreBuilder<T, A> {
	/// Registers `handler` for actions tagged `tag`, replacing any earlier one.
	pub fn on(mut self, tag: A::Tag, handler: impl Fn(&Store<T, A>, A) + 'static) -> Self {
		self.handlers.insert(tag, Rc::new(handler));
		self
	}

	pub fn build(self) -> Store<T, A> {
		Store(Rc::new(StoreInner {
			state: State::new(self.initial),
			handlers: self.handlers,
		}))
	}
}
