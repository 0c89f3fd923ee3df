//! Components and the bookkeeping that gives them identity across renders.
//!
//! A component value is rebuilt by its parent on every render.
//! The first value for a given position (or key) becomes a persistent instance.
//! Later values are only used to [`apply_props`](`Component::apply_props`) to that instance.
//!
//! State slots and positional children are matched by call order.
//! If a render conditionally skips a [`state`](`crate::builder::Ui::state`) call or a child,
//! every later slot of that component shifts by one.
//! Keyed children don't have this problem.

use crate::{builder::Ui, inspect::Inspector, surface::Surface};
use core::{
	any::{type_name, Any, TypeId},
	cell::Cell,
	fmt::{self, Display, Formatter},
};
use hashbrown::{HashMap, HashSet};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use tracing::{error, trace_span, warn};

/// Identifies a component instance within its [`Scheduler`](`crate::scheduler::Scheduler`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}

impl Display for InstanceId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// An explicit child identity, independent of call order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
	Index(i64),
	Name(Rc<str>),
}

macro_rules! key_from_integer {
	($($ty:ty),*$(,)?) => {$(
		impl From<$ty> for Key {
			fn from(index: $ty) -> Self {
				Self::Index(index.into())
			}
		}
	)*};
}
key_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Key {
	#[allow(clippy::cast_possible_wrap)]
	fn from(index: usize) -> Self {
		Self::Index(index as i64)
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Self::Name(name.into())
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Self::Name(name.into())
	}
}

impl From<Rc<str>> for Key {
	fn from(name: Rc<str>) -> Self {
		Self::Name(name)
	}
}

/// Where a routed tree was navigated to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavEntry {
	/// The route pattern that matched, like `/user/:id`.
	pub route: String,
	/// The full path, including any query string.
	pub path: String,
	pub params: BTreeMap<String, String>,
	pub query: BTreeMap<String, String>,
}

impl NavEntry {
	#[must_use]
	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}

	#[must_use]
	pub fn query(&self, name: &str) -> Option<&str> {
		self.query.get(name).map(String::as_str)
	}
}

/// A stateful render function.
///
/// Implementors hold props only. State lives in slots requested from the [`Ui`] during [`render`](`Component::render`).
pub trait Component<S: Surface>: 'static {
	fn render(&mut self, ui: &mut Ui<'_, S>);

	/// Takes the props of a freshly built value that was matched to this instance.
	///
	/// The default replaces `self` entirely.
	fn apply_props(&mut self, incoming: Self)
	where
		Self: Sized,
	{
		*self = incoming
	}

	/// Called after [`apply_props`](`Component::apply_props`), right before the instance is rendered again.
	fn updated(&mut self) {}

	/// Called once after the first render that attached this instance's output.
	fn mounted(&mut self) {}

	/// Called once after the instance stopped being rendered. Its state slots are gone by then.
	fn unmounted(&mut self) {}

	/// Called by a [`Router`](`crate::router::Router`) on the component about to be navigated to.
	///
	/// Navigation continues only if `proceed` is called.
	fn before_navigate(&mut self, from: &NavEntry, to: &NavEntry, proceed: &mut dyn FnMut()) {
		let _ = (from, to);
		proceed()
	}

	fn name(&self) -> &'static str {
		type_name::<Self>()
	}
}

pub(crate) trait AnyComponent<S: Surface> {
	fn render_erased(&mut self, ui: &mut Ui<'_, S>);
	fn absorb(&mut self, incoming: Box<dyn Any>);
	fn on_updated(&mut self);
	fn on_mounted(&mut self);
	fn on_unmounted(&mut self);
	fn navigating(&mut self, from: &NavEntry, to: &NavEntry, proceed: &mut dyn FnMut());
	fn erased_name(&self) -> &'static str;
	fn erased_type(&self) -> TypeId;
}

impl<S: Surface, C: Component<S>> AnyComponent<S> for C {
	fn render_erased(&mut self, ui: &mut Ui<'_, S>) {
		self.render(ui)
	}

	fn absorb(&mut self, incoming: Box<dyn Any>) {
		match incoming.downcast::<C>() {
			Ok(incoming) => self.apply_props(*incoming),
			Err(_) => error!("Tried to absorb a value of another type into {}. Ignoring it.", type_name::<C>()),
		}
	}

	fn on_updated(&mut self) {
		self.updated()
	}

	fn on_mounted(&mut self) {
		self.mounted()
	}

	fn on_unmounted(&mut self) {
		self.unmounted()
	}

	fn navigating(&mut self, from: &NavEntry, to: &NavEntry, proceed: &mut dyn FnMut()) {
		self.before_navigate(from, to, proceed)
	}

	fn erased_name(&self) -> &'static str {
		self.name()
	}

	fn erased_type(&self) -> TypeId {
		TypeId::of::<C>()
	}
}

struct StateSlot {
	value: Box<dyn Any>,
	type_name: &'static str,
}

/// The per-instance registries that render calls are matched against.
pub(crate) struct Slots<S: Surface> {
	states: Vec<StateSlot>,
	state_cursor: usize,
	children: Vec<Rc<Instance<S>>>,
	child_cursor: usize,
	keyed: HashMap<Key, Rc<Instance<S>>>,
	keyed_reached: HashSet<Key>,
	pub(crate) nav: Option<Rc<NavEntry>>,
}

impl<S: Surface> Slots<S> {
	fn new(nav: Option<Rc<NavEntry>>) -> Self {
		Self {
			states: Vec::new(),
			state_cursor: 0,
			children: Vec::new(),
			child_cursor: 0,
			keyed: HashMap::new(),
			keyed_reached: HashSet::new(),
			nav,
		}
	}

	pub(crate) fn begin_render(&mut self) {
		self.state_cursor = 0;
		self.child_cursor = 0;
		self.keyed_reached.clear();
	}

	/// Forgets children that weren't requested during this render.
	///
	/// They stay alive in the scheduler's previous reached set until they are unmounted.
	pub(crate) fn end_render(&mut self) {
		self.children.truncate(self.child_cursor);
		let reached = &self.keyed_reached;
		self.keyed.retain(|key, _| reached.contains(key));
	}

	/// Returns the value in the next state slot, or stores the one created by `init`.
	///
	/// # Panics
	///
	/// Iff the slot exists but holds another type, which means `owner` requested its slots out of order.
	pub(crate) fn claim_state<V: Any + Clone>(&mut self, owner: &str, init: impl FnOnce(usize) -> V) -> (usize, V) {
		let index = self.state_cursor;
		self.state_cursor += 1;
		if let Some(slot) = self.states.get(index) {
			return match slot.value.downcast_ref::<V>() {
				Some(value) => (index, value.clone()),
				None => panic!(
					"State slot {} of {} holds a {} but a {} was requested. State slots must be requested in the same order on every render.",
					index,
					owner,
					slot.type_name,
					type_name::<V>(),
				),
			};
		}

		debug_assert_eq!(index, self.states.len());
		let value = init(index);
		self.states.push(StateSlot {
			value: Box::new(value.clone()),
			type_name: type_name::<V>(),
		});
		(index, value)
	}

	pub(crate) fn replace_state<V: Any>(&mut self, index: usize, value: V) {
		self.states[index] = StateSlot {
			value: Box::new(value),
			type_name: type_name::<V>(),
		}
	}

	/// Matches `component` to an existing instance, by `key` or by call order, or registers the one made by `create`.
	pub(crate) fn claim_child<C: Component<S>>(&mut self, key: Option<Key>, component: C, create: impl FnOnce(Box<dyn AnyComponent<S>>) -> Rc<Instance<S>>) -> Rc<Instance<S>> {
		let type_id = TypeId::of::<C>();
		match key {
			None => {
				let index = self.child_cursor;
				self.child_cursor += 1;
				match self.children.get(index) {
					Some(existing) if existing.type_id == type_id => {
						let existing = Rc::clone(existing);
						existing.absorb(Box::new(component));
						existing
					}
					Some(existing) => {
						warn!(
							"Positional child {} changed from {} to {}. Its state is discarded. Consider using a key.",
							index,
							existing.name,
							type_name::<C>()
						);
						let fresh = create(Box::new(component));
						self.children[index] = Rc::clone(&fresh);
						fresh
					}
					None => {
						let fresh = create(Box::new(component));
						self.children.push(Rc::clone(&fresh));
						fresh
					}
				}
			}

			Some(key) => {
				if !self.keyed_reached.insert(key.clone()) {
					warn!("Duplicate child key {:?}. Both uses refer to the same instance.", key)
				}
				match self.keyed.get(&key) {
					Some(existing) if existing.type_id == type_id => {
						let existing = Rc::clone(existing);
						existing.absorb(Box::new(component));
						existing
					}
					previous => {
						if let Some(previous) = previous {
							warn!("Child {:?} changed from {} to {}. Its state is discarded.", key, previous.name, type_name::<C>());
						}
						let fresh = create(Box::new(component));
						self.keyed.insert(key, Rc::clone(&fresh));
						fresh
					}
				}
			}
		}
	}
}

/// The persistent side of a component.
pub(crate) struct Instance<S: Surface> {
	pub(crate) id: InstanceId,
	pub(crate) parent: Option<InstanceId>,
	pub(crate) name: &'static str,
	type_id: TypeId,
	pub(crate) component: RefCell<Box<dyn AnyComponent<S>>>,
	pub(crate) slots: RefCell<Slots<S>>,
	pub(crate) mounted: Rc<Cell<bool>>,
}

impl<S: Surface> Instance<S> {
	pub(crate) fn new(id: InstanceId, parent: Option<InstanceId>, component: Box<dyn AnyComponent<S>>, nav: Option<Rc<NavEntry>>) -> Rc<Self> {
		Rc::new(Self {
			id,
			parent,
			name: component.erased_name(),
			type_id: component.erased_type(),
			component: RefCell::new(component),
			slots: RefCell::new(Slots::new(nav)),
			mounted: Rc::new(Cell::new(false)),
		})
	}

	fn absorb(&self, incoming: Box<dyn Any>) {
		let mut component = self.component.borrow_mut();
		component.absorb(incoming);
		component.on_updated();
	}

	pub(crate) fn is_mounted(&self) -> bool {
		self.mounted.get()
	}

	/// Idempotent.
	pub(crate) fn mount(&self, inspector: &dyn Inspector) {
		if self.mounted.replace(true) {
			return;
		}
		let span = trace_span!("Mounting", id = %self.id, name = self.name);
		let _enter = span.enter();
		self.component.borrow_mut().on_mounted();
		inspector.component_mounted(self.id, self.name);
	}

	/// Idempotent. Unmounts children first, then drops all state slots.
	pub(crate) fn unmount(&self, inspector: &dyn Inspector) {
		if !self.mounted.replace(false) {
			return;
		}
		let span = trace_span!("Unmounting", id = %self.id, name = self.name);
		let _enter = span.enter();

		let (states, children) = {
			let mut guard = self.slots.borrow_mut();
			let slots = &mut *guard;
			slots.keyed_reached.clear();
			let children: Vec<_> = slots.children.drain(..).chain(slots.keyed.drain().map(|(_, child)| child)).collect();
			(core::mem::take(&mut slots.states), children)
		};
		for child in &children {
			child.unmount(inspector)
		}
		drop(states);

		self.component.borrow_mut().on_unmounted();
		inspector.component_unmounted(self.id);
	}
}
