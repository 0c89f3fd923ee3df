//! The imperative tree builder handed to [`Component::render`].
//!
//! Every call appends to the current children list, in call order.
//! Element callbacks receive an [`ElementBuilder`] whose own calls append to that element's children instead.

use crate::{
	component::{Component, Instance, InstanceId, Key, NavEntry},
	node::{Directive, DirectiveFn, Element, Node, Transition},
	reactive::{Action, State, Store, SubscriptionId},
	scheduler::{Pass, WeakScheduler},
	surface::Surface,
};
use core::{
	fmt::Debug,
	ops::{Deref, DerefMut},
};
use std::{borrow::Cow, cell::Cell, rc::Rc};
use tracing::{trace, warn};

/// Builds the output of one component render.
pub struct Ui<'p, S: Surface> {
	pass: &'p mut Pass<S>,
	owner: Rc<Instance<S>>,
	nodes: Vec<Node<S>>,
}

impl<'p, S: Surface> Ui<'p, S> {
	pub(crate) fn new(pass: &'p mut Pass<S>, owner: Rc<Instance<S>>) -> Self {
		Self {
			pass,
			owner,
			nodes: Vec::new(),
		}
	}

	pub(crate) fn into_nodes(self) -> Vec<Node<S>> {
		self.nodes
	}

	/// The instance this render belongs to.
	#[must_use]
	pub fn id(&self) -> InstanceId {
		self.owner.id
	}

	#[must_use]
	pub fn parent_id(&self) -> Option<InstanceId> {
		self.owner.parent
	}

	/// The scheduler running this render, for use in listeners.
	#[must_use]
	pub fn scheduler(&self) -> WeakScheduler<S> {
		self.pass.scheduler().clone()
	}

	pub fn text(&mut self, value: impl Into<String>) {
		self.nodes.push(Node::Text(value.into()))
	}

	/// Appends markup that is inserted verbatim. It is not escaped or sanitized in any way.
	pub fn raw_markup(&mut self, html: impl Into<String>) {
		self.nodes.push(Node::Raw(html.into()))
	}

	/// Appends an element configured by `configure`.
	pub fn element(&mut self, tag: impl Into<Cow<'static, str>>, configure: impl FnOnce(&mut ElementBuilder<'_, S>)) {
		let mut builder = ElementBuilder {
			element: Element::new(tag),
			ui: Ui {
				pass: &mut *self.pass,
				owner: Rc::clone(&self.owner),
				nodes: Vec::new(),
			},
		};
		configure(&mut builder);
		let ElementBuilder { mut element, ui } = builder;
		element.children = ui.nodes;
		self.nodes.push(Node::Element(element))
	}

	/// Renders `component` in place, matched to an earlier instance by call order.
	pub fn child<C: Component<S>>(&mut self, component: C) -> InstanceId {
		self.embed(None, component)
	}

	/// Renders `component` in place, matched to an earlier instance by `key`.
	pub fn keyed<C: Component<S>>(&mut self, key: impl Into<Key>, component: C) -> InstanceId {
		self.embed(Some(key.into()), component)
	}

	fn embed<C: Component<S>>(&mut self, key: Option<Key>, component: C) -> InstanceId {
		let parent = self.owner.id;
		let nav = self.owner.slots.borrow().nav.clone();
		let pass = &mut *self.pass;
		let instance = self
			.owner
			.slots
			.borrow_mut()
			.claim_child(key, component, |component| Instance::new(pass.allocate_id(), Some(parent), component, nav));
		let nodes = self.pass.render(&instance);
		self.nodes.extend(nodes);
		instance.id
	}

	/// Claims the next state slot, initialized to `initial` on first use.
	pub fn state<T: Debug + 'static>(&mut self, initial: T) -> State<T> {
		self.claim_state("state", move || initial)
	}

	/// Like [`Ui::state`], but `init` only runs when the slot is created.
	pub fn state_with<T: Debug + 'static>(&mut self, init: impl FnOnce() -> T) -> State<T> {
		self.claim_state("state", init)
	}

	/// Like [`Ui::state`], with a name for [`Inspector`](`crate::inspect::Inspector`)s.
	pub fn state_named<T: Debug + 'static>(&mut self, name: &'static str, initial: T) -> State<T> {
		self.claim_state(name, move || initial)
	}

	fn claim_state<T: Debug + 'static>(&mut self, name: &'static str, init: impl FnOnce() -> T) -> State<T> {
		let owner = Rc::clone(&self.owner);
		let scheduler = self.pass.scheduler().clone();
		let (_, state) = owner.slots.borrow_mut().claim_state(owner.name, |slot| {
			let state = State::new(init());
			let weak = state.downgrade();
			let mounted = Rc::clone(&owner.mounted);
			let id = owner.id;
			state.subscribe(move || {
				if !mounted.get() {
					return trace!(%id, slot, "State changed while not mounted. Not rendering.");
				}
				let scheduler = match scheduler.upgrade() {
					Some(scheduler) => scheduler,
					None => return,
				};
				if let Some(state) = weak.upgrade() {
					let value = format!("{:?}", &*state.borrow());
					scheduler.inspector().state_changed(id, slot, name, &value);
				}
				scheduler.request_render()
			});
			state
		});
		state
	}

	/// Subscribes this instance to `store` and returns its current state.
	///
	/// Occupies one state slot. The subscription ends when the instance is unmounted.
	pub fn use_store<T: Clone + Debug + 'static, A: Action>(&mut self, store: &Store<T, A>) -> T {
		let owner = Rc::clone(&self.owner);
		let scheduler = self.pass.scheduler().clone();
		let subscribe = |slot| Rc::new(StoreSubscription::new(store, &*owner, slot, scheduler.clone()));

		let mut slots = owner.slots.borrow_mut();
		let (slot, subscription) = slots.claim_state(owner.name, &subscribe);
		if !subscription.store.ptr_eq(store) {
			trace!(slot, "Store changed. Resubscribing.");
			slots.replace_state(slot, subscribe(slot));
		}
		drop(slots);
		store.state()
	}

	/// Where this component's routed tree was navigated to, if a [`Router`](`crate::router::Router`) mounted it.
	///
	/// Children receive their owner's entry when they are first created.
	#[must_use]
	pub fn nav(&self) -> Option<Rc<NavEntry>> {
		self.owner.slots.borrow().nav.clone()
	}

	#[must_use]
	pub fn param(&self, name: &str) -> Option<String> {
		self.nav().and_then(|nav| nav.param(name).map(ToOwned::to_owned))
	}

	#[must_use]
	pub fn query(&self, name: &str) -> Option<String> {
		self.nav().and_then(|nav| nav.query(name).map(ToOwned::to_owned))
	}
}

struct StoreSubscription<T, A: Action> {
	store: Store<T, A>,
	id: SubscriptionId,
}

impl<T: Debug + 'static, A: Action> StoreSubscription<T, A> {
	fn new<S: Surface>(store: &Store<T, A>, owner: &Instance<S>, slot: usize, scheduler: WeakScheduler<S>) -> Self {
		let mounted: Rc<Cell<bool>> = Rc::clone(&owner.mounted);
		let id = owner.id;
		let weak = store.cell().downgrade();
		Self {
			store: store.clone(),
			id: store.subscribe(move || {
				if !mounted.get() {
					return;
				}
				if let Some(scheduler) = scheduler.upgrade() {
					if let Some(state) = weak.upgrade() {
						let value = format!("{:?}", &*state.borrow());
						scheduler.inspector().state_changed(id, slot, "store", &value);
					}
					scheduler.request_render()
				}
			}),
		}
	}
}

impl<T, A: Action> Drop for StoreSubscription<T, A> {
	fn drop(&mut self) {
		self.store.unsubscribe(self.id);
	}
}

/// Configures one element. Dereferences to a [`Ui`] that appends to the element's children.
pub struct ElementBuilder<'u, S: Surface> {
	element: Element<S>,
	ui: Ui<'u, S>,
}

impl<'u, S: Surface> Deref for ElementBuilder<'u, S> {
	type Target = Ui<'u, S>;

	fn deref(&self) -> &Self::Target {
		&self.ui
	}
}

impl<'u, S: Surface> DerefMut for ElementBuilder<'u, S> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.ui
	}
}

impl<'u, S: Surface> ElementBuilder<'u, S> {
	#[must_use]
	pub fn tag(&self) -> &str {
		&self.element.tag
	}

	pub fn attr(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> &mut Self {
		self.element.attributes.insert(name.into(), value.into());
		self
	}

	pub fn class(&mut self, value: impl Into<String>) -> &mut Self {
		self.attr("class", value)
	}

	/// Appends a declaration to the `style` attribute.
	pub fn style(&mut self, declaration: impl AsRef<str>) -> &mut Self {
		let style = self.element.attributes.entry(Cow::Borrowed("style")).or_default();
		if !style.is_empty() && !style.ends_with(';') {
			style.push(';');
		}
		style.push_str(declaration.as_ref());
		self
	}

	/// Sets the `value`, which on form controls is reconciled against what the user typed.
	pub fn value(&mut self, value: impl Into<String>) -> &mut Self {
		self.attr("value", value)
	}

	/// Binds `listener` to `event`. A second listener for the same event replaces the first.
	pub fn on(&mut self, event: impl Into<Cow<'static, str>>, listener: impl Fn(&S::Event) + 'static) -> &mut Self {
		let event = event.into();
		if self.element.listeners.insert(event.clone(), Rc::new(listener)).is_some() {
			warn!("Replaced earlier {:?} listener on <{}>.", event, self.element.tag)
		}
		self
	}

	pub fn directive(&mut self, directive: impl Directive<S> + 'static) -> &mut Self {
		self.element.directives.push(Rc::new(directive));
		self
	}

	/// Runs `apply` on the live element after creation and after every patch.
	pub fn directive_fn(&mut self, apply: impl Fn(&S, &S::Node) + 'static) -> &mut Self {
		self.directive(DirectiveFn(apply))
	}

	/// Uses `transition` both when the element enters and when it leaves.
	pub fn transition(&mut self, transition: impl Transition<S> + 'static) -> &mut Self {
		let transition: Rc<dyn Transition<S>> = Rc::new(transition);
		self.element.enter = Some(Rc::clone(&transition));
		self.element.exit = Some(transition);
		self
	}

	pub fn transition_in(&mut self, transition: impl Transition<S> + 'static) -> &mut Self {
		self.element.enter = Some(Rc::new(transition));
		self
	}

	pub fn transition_out(&mut self, transition: impl Transition<S> + 'static) -> &mut Self {
		self.element.exit = Some(Rc::new(transition));
		self
	}
}

macro_rules! tags {
	($($tag:ident),*$(,)?) => {
		impl<'p, S: Surface> Ui<'p, S> {$(
			#[doc = concat!("Appends a `<", stringify!($tag), ">` element.")]
			pub fn $tag(&mut self, configure: impl FnOnce(&mut ElementBuilder<'_, S>)) {
				self.element(stringify!($tag), configure)
			}
		)*}
	};
}
tags!(a, button, code, div, form, h1, h2, h3, img, input, label, li, ol, option, p, pre, section, select, span, textarea, ul);
