//! The reconciler: patches a live surface from one committed [`Node`] list to the next.

use crate::{
	node::{Directive, Element, Listener, Node, Phase, Transition},
	surface::Surface,
};
use core::cell::Cell;
use std::{borrow::Cow, cell::RefCell, rc::Rc};
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Form controls whose `value` attribute is reconciled against the live (user-editable) property.
fn has_live_value(tag: &str) -> bool {
	tag.eq_ignore_ascii_case("input") || tag.eq_ignore_ascii_case("textarea") || tag.eq_ignore_ascii_case("select")
}

/// Listeners and directives found in a subtree that is about to be detached.
struct Bindings<S: Surface> {
	listeners: Vec<(S::Node, Cow<'static, str>, Listener<S>)>,
	directives: Vec<(S::Node, Rc<dyn Directive<S>>)>,
}
impl<S: Surface> Bindings<S> {
	fn new() -> Self {
		Self {
			listeners: Vec::new(),
			directives: Vec::new(),
		}
	}

	fn release(self, surface: &S) {
		let span = trace_span!("Releasing bindings", listeners = self.listeners.len(), directives = self.directives.len());
		let _enter = span.enter();
		for (element, event, listener) in self.listeners {
			surface.remove_listener(&element, &event, &listener)
		}
		for (element, directive) in self.directives {
			directive.dispose(surface, &element)
		}
	}
}

/// Enter effects of freshly created elements, started once the whole batch is attached.
type Entered<S> = Vec<(Rc<dyn Transition<S>>, <S as Surface>::Node)>;

/// Applies the difference between two [`Node`] lists to the children of a live container.
///
/// Children are matched purely by position.
/// Reordering an unkeyed list therefore patches content into the existing live nodes instead of moving them.
///
/// Live nodes whose exit effect is still running are tracked here and skipped when matching,
/// so the same [`Reconciler`] must be used for every update of a given container.
pub struct Reconciler<S: Surface> {
	surface: S,
	leaving: Rc<RefCell<Vec<S::Node>>>,
	depth_limit: Cell<usize>,
}

impl<S: Surface> Reconciler<S> {
	pub const DEFAULT_DEPTH_LIMIT: usize = 256;

	#[must_use]
	pub fn new(surface: S) -> Self {
		Self {
			surface,
			leaving: Rc::default(),
			depth_limit: Cell::new(Self::DEFAULT_DEPTH_LIMIT),
		}
	}

	#[must_use]
	pub fn surface(&self) -> &S {
		&self.surface
	}

	#[must_use]
	pub fn depth_limit(&self) -> usize {
		self.depth_limit.get()
	}

	/// Sets how many element levels are descended into before giving up with an error.
	pub fn set_depth_limit(&self, depth_limit: usize) {
		self.depth_limit.set(depth_limit)
	}

	/// How many live nodes are currently kept attached by a running exit effect.
	#[must_use]
	pub fn leaving_count(&self) -> usize {
		self.leaving.borrow().len()
	}

	/// Patches the children of `parent` from `old` (the previously committed list) to `new`.
	///
	/// The live children of `parent` (apart from leaving ones) are expected to correspond to `old`.
	/// Drift is logged and tolerated where possible.
	#[instrument(skip(self, old, new), fields(old.len = old.len(), new.len = new.len()))]
	pub fn update_child_nodes(&self, parent: &S::Node, old: &[Node<S>], new: &[Node<S>]) {
		let mut entered = Vec::new();
		self.diff_children(parent, old, new, self.depth_limit.get(), &mut entered);

		for (transition, element) in entered {
			let span = trace_span!("Starting enter effect", ?element);
			let _enter = span.enter();
			transition.start(Phase::Enter, &self.surface, &element, Box::new(|| ()))
		}
	}

	/// The live children of `parent` that take part in matching.
	fn live_children(&self, parent: &S::Node) -> Vec<S::Node> {
		let mut children = self.surface.child_nodes(parent);
		let leaving = self.leaving.borrow();
		if !leaving.is_empty() {
			children.retain(|child| !leaving.contains(child))
		}
		children
	}

	fn diff_children(&self, parent: &S::Node, old: &[Node<S>], new: &[Node<S>], depth_limit: usize, entered: &mut Entered<S>) {
		if depth_limit == 0 {
			return error!("Depth limit reached");
		}

		let live = self.live_children(parent);
		if STATIC_MAX_LEVEL >= Level::WARN && live.len() != old.len() {
			warn!("Expected {} live child node(s) but found {}.", old.len(), live.len());
		}

		for i in 0..old.len().max(new.len()) {
			match (old.get(i), new.get(i), live.get(i)) {
				(_, Some(new), None) => {
					if i < old.len() {
						error!("Expected {} beyond end of live child nodes. Creating it instead.", new.kind());
					}
					let created = self.create(new, depth_limit, entered);
					self.surface.append_child(parent, &created);
				}
				(Some(old), Some(new), Some(live)) => self.patch(parent, old, new, live, depth_limit, entered),
				(Some(old), None, Some(live)) => self.remove(parent, old, live, depth_limit),
				(Some(old), None, None) => error!("Expected to remove {} beyond end of live child nodes. Ignoring bindings.", old.kind()),
				(None, None, _) => unreachable!(),
				(None, Some(new), Some(live)) => {
					error!("Found unexpected live node {:?} where {} is to be created. Creating it in front.", live, new.kind());
					let created = self.create(new, depth_limit, entered);
					self.surface.insert_before(parent, &created, live);
				}
			}
		}
	}

	fn patch(&self, parent: &S::Node, old: &Node<S>, new: &Node<S>, live: &S::Node, depth_limit: usize, entered: &mut Entered<S>) {
		match (old, new) {
			(Node::Text(t_1), Node::Text(t_2)) => {
				let span = if cfg!(feature = "dangerous-logging") {
					trace_span!("Diffing text", t_1 = t_1.as_str(), t_2 = t_2.as_str())
				} else {
					trace_span!("Diffing text")
				};
				let _enter = span.enter();
				if t_1 != t_2 {
					self.surface.set_text(live, t_2)
				}
			}

			(Node::Raw(m_1), Node::Raw(m_2)) => {
				let span = if cfg!(feature = "dangerous-logging") {
					trace_span!("Diffing raw markup", m_1 = m_1.as_str(), m_2 = m_2.as_str())
				} else {
					trace_span!("Diffing raw markup")
				};
				let _enter = span.enter();
				if m_1 != m_2 {
					self.surface.set_raw(live, m_2)
				}
			}

			(Node::Element(e_1), Node::Element(e_2)) if e_1.tag == e_2.tag => {
				let span = trace_span!("Diffing element", tag = &*e_1.tag);
				let _enter = span.enter();
				self.update_element(e_1, e_2, live, depth_limit, entered)
			}

			(old, new) => {
				let span = trace_span!("Replacing node", old = old.kind(), new = new.kind());
				let _enter = span.enter();
				if let (Node::Element(e_1), Node::Element(e_2)) = (old, new) {
					if e_1.tag.eq_ignore_ascii_case(&e_2.tag) {
						warn!("Tags <{}> and <{}> differ only in case. The element is recreated.", e_1.tag, e_2.tag)
					}
				}
				self.replace(parent, old, new, live, depth_limit, entered)
			}
		}
	}

	#[allow(clippy::similar_names)]
	#[instrument(skip(self, e_1, e_2, entered), fields(tag = &*e_2.tag))]
	fn update_element(&self, e_1: &Element<S>, e_2: &Element<S>, element: &S::Node, depth_limit: usize, entered: &mut Entered<S>) {
		debug_assert_eq!(e_1.tag, e_2.tag);
		let live_value = has_live_value(&e_2.tag);

		for (name, value) in &e_2.attributes {
			if !(live_value && name == "value") && e_1.attributes.get(name) != Some(value) {
				self.set_attribute(element, name, value)
			}
		}
		for name in e_1.attributes.keys() {
			if !e_2.attributes.contains_key(name) && !(live_value && name == "value") {
				self.surface.remove_attribute(element, name)
			}
		}

		for (event, listener) in &e_1.listeners {
			self.surface.remove_listener(element, event, listener)
		}
		for (event, listener) in &e_2.listeners {
			self.surface.add_listener(element, event, listener)
		}

		self.diff_children(element, &e_1.children, &e_2.children, depth_limit - 1, entered);

		// A `select` only accepts values that match one of its current options.
		if live_value {
			match e_2.attributes.get("value") {
				Some(value) if self.surface.live_value(element).as_deref() != Some(value.as_str()) => {
					self.surface.set_live_value(element, value)
				}
				None if e_1.attributes.contains_key("value") => self.surface.set_live_value(element, ""),
				_ => (),
			}
		}

		for directive in &e_2.directives {
			directive.apply(&self.surface, element)
		}
	}

	fn set_attribute(&self, element: &S::Node, name: &str, value: &str) {
		if name == "class" {
			self.surface.set_class_name(element, value)
		} else {
			self.surface.set_attribute(element, name, value)
		}
	}

	/// Builds the live counterpart of `node`, without attaching it.
	fn create(&self, node: &Node<S>, depth_limit: usize, entered: &mut Entered<S>) -> S::Node {
		match node {
			Node::Text(text) => {
				let span = if cfg!(feature = "dangerous-logging") {
					trace_span!("Creating text node", text = text.as_str())
				} else {
					trace_span!("Creating text node")
				};
				let _enter = span.enter();
				self.surface.create_text(text)
			}

			Node::Raw(markup) => {
				let span = if cfg!(feature = "dangerous-logging") {
					trace_span!("Creating raw markup", markup = markup.as_str())
				} else {
					trace_span!("Creating raw markup")
				};
				let _enter = span.enter();
				self.surface.create_raw(markup)
			}

			Node::Element(element) => {
				let span = trace_span!("Creating element", tag = &*element.tag, children = element.children.len());
				let _enter = span.enter();

				let live = self.surface.create_element(&element.tag);
				let live_value = has_live_value(&element.tag);
				for (name, value) in &element.attributes {
					if !(live_value && name == "value") {
						self.set_attribute(&live, name, value)
					}
				}
				for (event, listener) in &element.listeners {
					self.surface.add_listener(&live, event, listener)
				}

				if let Some(enter) = &element.enter {
					entered.push((Rc::clone(enter), live.clone()))
				}

				if !element.children.is_empty() {
					if depth_limit <= 1 {
						error!("Depth limit reached");
					} else {
						for child in &element.children {
							let child = self.create(child, depth_limit - 1, entered);
							self.surface.append_child(&live, &child)
						}
					}
				}

				if live_value {
					if let Some(value) = element.attributes.get("value") {
						self.surface.set_live_value(&live, value)
					}
				}
				for directive in &element.directives {
					directive.apply(&self.surface, &live)
				}
				live
			}
		}
	}

	fn replace(&self, parent: &S::Node, old: &Node<S>, new: &Node<S>, live: &S::Node, depth_limit: usize, entered: &mut Entered<S>) {
		let created = self.create(new, depth_limit, entered);
		match old {
			Node::Element(Element { exit: Some(exit), .. }) => {
				self.surface.insert_before(parent, &created, live);
				self.leave(Rc::clone(exit), old, live, depth_limit)
			}
			_ => {
				let mut bindings = Bindings::new();
				self.collect_bindings(old, live, depth_limit, &mut bindings);
				bindings.release(&self.surface);
				self.surface.replace_child(parent, &created, live)
			}
		}
	}

	fn remove(&self, parent: &S::Node, old: &Node<S>, live: &S::Node, depth_limit: usize) {
		let span = trace_span!("Removing node", kind = old.kind());
		let _enter = span.enter();
		match old {
			Node::Element(Element { exit: Some(exit), .. }) => self.leave(Rc::clone(exit), old, live, depth_limit),
			_ => {
				let mut bindings = Bindings::new();
				self.collect_bindings(old, live, depth_limit, &mut bindings);
				bindings.release(&self.surface);
				self.surface.remove_child(parent, live)
			}
		}
	}

	/// Starts the exit effect of `live`, detaching it only once the effect completes.
	fn leave(&self, exit: Rc<dyn Transition<S>>, old: &Node<S>, live: &S::Node, depth_limit: usize) {
		let mut bindings = Bindings::new();
		self.collect_bindings(old, live, depth_limit, &mut bindings);
		self.leaving.borrow_mut().push(live.clone());
		trace!("Deferring removal of {:?} until its exit effect completes.", live);

		let surface = self.surface.clone();
		let leaving = Rc::clone(&self.leaving);
		let detached = live.clone();
		exit.start(
			Phase::Exit,
			&self.surface,
			live,
			Box::new(move || {
				let span = trace_span!("Exit effect completed", node = ?detached);
				let _enter = span.enter();
				leaving.borrow_mut().retain(|node| node != &detached);
				bindings.release(&surface);
				match surface.parent(&detached) {
					Some(parent) => surface.remove_child(&parent, &detached),
					None => trace!("Node was detached already."),
				}
			}),
		)
	}

	/// Gathers the bindings of a subtree that is about to be detached, walking old and live trees in parallel.
	fn collect_bindings(&self, node: &Node<S>, live: &S::Node, depth_limit: usize, bindings: &mut Bindings<S>) {
		if depth_limit == 0 {
			return error!("Depth limit reached");
		}

		if let Node::Element(element) = node {
			for (event, listener) in &element.listeners {
				bindings.listeners.push((live.clone(), event.clone(), Rc::clone(listener)))
			}
			for directive in &element.directives {
				bindings.directives.push((live.clone(), Rc::clone(directive)))
			}

			if element.children.iter().any(|child| child.as_element().is_some()) {
				let live_children = self.live_children(live);
				if live_children.len() != element.children.len() {
					warn!(
						"Expected {} live child node(s) to unbind but found {}. Bindings may be unaccounted for.",
						element.children.len(),
						live_children.len()
					)
				}
				for (child, live_child) in element.children.iter().zip(&live_children) {
					self.collect_bindings(child, live_child, depth_limit - 1, bindings)
				}
			}
		}
	}
}
