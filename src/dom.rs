//! The browser DOM as a [`Surface`].

use crate::{
	component::Component,
	error::MountError,
	listener_cache::ListenerCache,
	node::Listener,
	scheduler::Scheduler,
	surface::Surface,
};
use core::fmt::{self, Debug, Formatter};
use js_sys::Function;
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};
use wasm_bindgen::{closure::Closure, throw_val, JsCast};
use web_sys::{Document, Element, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement, Node, Text};

type Handle = Closure<dyn Fn(web_sys::Event)>;

struct Inner {
	document: Document,
	/// One JavaScript closure per distinct [`Listener`], shared by all of its bindings.
	handles: RefCell<ListenerCache<Handle>>,
}

/// A [`Surface`] backed by [`web_sys`].
///
/// # Safety
///
/// Event listener closures are reference-counted per [`DomSurface`] (and its clones) and freed on [`Surface::flush`].
/// Listeners that are still bound to elements when the last clone is dropped start throwing errors into JavaScript when called.
#[derive(Clone)]
pub struct DomSurface(Rc<Inner>);

impl Debug for DomSurface {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomSurface")
			.field("document", &self.0.document)
			.field("handles", &self.0.handles.borrow().len())
			.finish()
	}
}

impl DomSurface {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self(Rc::new(Inner {
			document,
			handles: RefCell::default(),
		}))
	}

	/// Uses the document of the current window.
	///
	/// # Errors
	///
	/// [`MountError::MissingDocument`] iff there is no window or it has no document.
	pub fn from_window() -> Result<Self, MountError> {
		web_sys::window().and_then(|window| window.document()).map(Self::new).ok_or(MountError::MissingDocument)
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.0.document
	}

	/// Mounts `root` into the element with the given `id`.
	///
	/// # Errors
	///
	/// [`MountError::MissingElement`] iff there is no such element. Nothing is rendered in that case.
	pub fn mount_to_id<C: Component<Self>>(&self, id: &str, root: C) -> Result<Scheduler<Self>, MountError> {
		let target = self.0.document.get_element_by_id(id).ok_or_else(|| {
			error!("No element with id {:?} to mount to.", id);
			MountError::MissingElement { id: id.to_owned() }
		})?;
		let scheduler = Scheduler::new(self.clone());
		scheduler.mount(Some(target.into()), root)?;
		Ok(scheduler)
	}

	/// Number of live listener closures, including ones not yet freed.
	#[must_use]
	pub fn listener_handle_count(&self) -> usize {
		self.0.handles.borrow().len()
	}

	fn element<'a>(node: &'a Node, operation: &str) -> Option<&'a Element> {
		let element = node.dyn_ref::<Element>();
		if element.is_none() {
			error!("Expected element to {} but found {:?}.", operation, node)
		}
		element
	}
}

impl Surface for DomSurface {
	type Node = Node;
	type Event = web_sys::Event;

	fn create_text(&self, value: &str) -> Node {
		self.0.document.create_text_node(value).into()
	}

	fn set_text(&self, node: &Node, value: &str) {
		match node.dyn_ref::<Text>() {
			Some(text) => text.set_data(value),
			None => error!("Expected to update `web_sys::Text` but found {:?}.", node),
		}
	}

	/// Hosts the markup in a `<span>`, since a fragment would dissolve on insertion.
	fn create_raw(&self, markup: &str) -> Node {
		let host = self.create_element("span");
		if let Some(element) = host.dyn_ref::<Element>() {
			element.set_inner_html(markup)
		}
		host
	}

	fn set_raw(&self, node: &Node, markup: &str) {
		if let Some(element) = Self::element(node, "set markup of") {
			element.set_inner_html(markup)
		}
	}

	fn create_element(&self, tag: &str) -> Node {
		match self.0.document.create_element(tag) {
			Ok(element) => element.into(),
			Err(error) => {
				error!("Failed to create <{}>: {:?}", tag, error);
				throw_val(error)
			}
		}
	}

	fn set_attribute(&self, element: &Node, name: &str, value: &str) {
		if let Some(element) = Self::element(element, "set an attribute on") {
			if let Err(error) = element.set_attribute(name, value) {
				error!("Could not set attribute {:?}: {:?}", name, error)
			}
		}
	}

	fn remove_attribute(&self, element: &Node, name: &str) {
		if let Some(element) = Self::element(element, "remove an attribute from") {
			if let Err(error) = element.remove_attribute(name) {
				warn!("Could not remove attribute {:?}: {:?}", name, error)
			}
		}
	}

	fn set_class_name(&self, element: &Node, value: &str) {
		if let Some(element) = Self::element(element, "set the class name of") {
			element.set_class_name(value)
		}
	}

	fn live_value(&self, element: &Node) -> Option<String> {
		if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
			Some(input.value())
		} else if let Some(text_area) = element.dyn_ref::<HtmlTextAreaElement>() {
			Some(text_area.value())
		} else {
			element.dyn_ref::<HtmlSelectElement>().map(HtmlSelectElement::value)
		}
	}

	fn set_live_value(&self, element: &Node, value: &str) {
		if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
			input.set_value(value)
		} else if let Some(text_area) = element.dyn_ref::<HtmlTextAreaElement>() {
			text_area.set_value(value)
		} else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value)
		} else {
			warn!("Tried to set the value of {:?}, which isn't a form control.", element)
		}
	}

	fn add_listener(&self, element: &Node, event: &str, listener: &Listener<Self>) {
		let mut handles = self.0.handles.borrow_mut();
		let handle = match handles.bind(listener, || {
			let listener = Rc::clone(listener);
			Closure::wrap(Box::new(move |event: web_sys::Event| listener(&event)) as Box<dyn Fn(web_sys::Event)>)
		}) {
			Ok(handle) => handle,
			Err(error) => return error!("Could not bind {:?} listener: {}", event, error),
		};
		if let Err(error) = element.add_event_listener_with_callback(event, handle.as_ref().unchecked_ref::<Function>()) {
			error!("Failed to add event listener {:?}: {:?}", event, error)
		}
	}

	fn remove_listener(&self, element: &Node, event: &str, listener: &Listener<Self>) {
		let mut handles = self.0.handles.borrow_mut();
		match handles.unbind(listener) {
			Ok(Some(handle)) => {
				if let Err(error) = element.remove_event_listener_with_callback(event, handle.as_ref().unchecked_ref::<Function>()) {
					error!("Failed to remove event listener {:?}: {:?}", event, error)
				}
			}
			Ok(None) => error!("Tried to remove {:?} listener that was never added.", event),
			Err(error) => error!("Could not unbind {:?} listener: {}", event, error),
		}
	}

	fn append_child(&self, parent: &Node, child: &Node) {
		if let Err(error) = parent.append_child(child) {
			error!("Failed to append child: {:?}", error)
		}
	}

	fn insert_before(&self, parent: &Node, child: &Node, reference: &Node) {
		if let Err(error) = parent.insert_before(child, Some(reference)) {
			error!("Failed to insert child: {:?}", error)
		}
	}

	fn replace_child(&self, parent: &Node, new: &Node, old: &Node) {
		if let Err(error) = parent.replace_child(new, old) {
			error!("Failed to replace child: {:?}", error)
		}
	}

	fn remove_child(&self, parent: &Node, child: &Node) {
		if let Err(error) = parent.remove_child(child) {
			error!("Failed to remove child: {:?}", error)
		}
	}

	fn parent(&self, node: &Node) -> Option<Node> {
		node.parent_node()
	}

	fn child_nodes(&self, parent: &Node) -> Vec<Node> {
		let child_nodes = parent.child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.get(i)).collect()
	}

	fn flush(&self) {
		let mut handles = self.0.handles.borrow_mut();
		let freed = handles.sweep();
		trace!("Freed {} event listener closure(s).", freed);
		info!("Event listener count/cached capacity: {}/{}", handles.len(), handles.capacity());
		if STATIC_MAX_LEVEL >= Level::WARN && handles.len() >= 10_000 {
			warn!(
				"There are {} live event listener closures.\n\
				This may point to listeners that are never unbound.",
				handles.len()
			)
		}
	}
}
