//! A headless [`Surface`] that keeps its tree in memory and journals every mutation.
//!
//! Useful for tests and for running components without a browser.
//!
//! Nodes are never freed: a [`MemoryNode`] stays readable after it is removed, so tests can inspect what was detached.
//! The reconciler unbinds listeners before detaching, so a removed node only keeps its tag, text and attributes.
//! Long-running hosts should recreate the surface or watch [`MemorySurface::node_count`].

use crate::{
	node::{listener_address, Listener},
	surface::Surface,
};
use core::fmt::{self, Debug, Formatter};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use tracing::{error, trace};

/// Handle to a node of a [`MemorySurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

/// The event type delivered to listeners by [`MemorySurface::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEvent {
	pub name: String,
	pub target: MemoryNode,
}

/// One recorded surface operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	CreateText { node: MemoryNode },
	CreateRaw { node: MemoryNode },
	CreateElement { node: MemoryNode, tag: String },
	SetText { node: MemoryNode, value: String },
	SetRaw { node: MemoryNode, markup: String },
	SetAttribute { node: MemoryNode, name: String, value: String },
	RemoveAttribute { node: MemoryNode, name: String },
	SetClassName { node: MemoryNode, value: String },
	SetValue { node: MemoryNode, value: String },
	AddListener { node: MemoryNode, event: String },
	RemoveListener { node: MemoryNode, event: String },
	Append { parent: MemoryNode, child: MemoryNode },
	InsertBefore { parent: MemoryNode, child: MemoryNode, reference: MemoryNode },
	Replace { parent: MemoryNode, new: MemoryNode, old: MemoryNode },
	Remove { parent: MemoryNode, child: MemoryNode },
}

impl Mutation {
	/// Listener (re)binding, which the reconciler performs on every patch of an element that has listeners.
	#[must_use]
	pub fn is_listener_binding(&self) -> bool {
		matches!(self, Mutation::AddListener { .. } | Mutation::RemoveListener { .. })
	}

	/// Operations that change which nodes are attached where.
	#[must_use]
	pub fn is_structural(&self) -> bool {
		matches!(
			self,
			Mutation::Append { .. } | Mutation::InsertBefore { .. } | Mutation::Replace { .. } | Mutation::Remove { .. }
		)
	}
}

enum Kind {
	Text(String),
	Raw(String),
	Element {
		tag: String,
		attributes: BTreeMap<String, String>,
		value: Option<String>,
		listeners: Vec<(String, Listener<MemorySurface>)>,
	},
}

struct Data {
	kind: Kind,
	parent: Option<usize>,
	children: Vec<usize>,
}

#[derive(Default)]
struct Arena {
	nodes: Vec<Data>,
	journal: Vec<Mutation>,
}

impl Arena {
	fn push(&mut self, kind: Kind) -> MemoryNode {
		self.nodes.push(Data {
			kind,
			parent: None,
			children: Vec::new(),
		});
		MemoryNode(self.nodes.len() - 1)
	}

	fn detach(&mut self, child: MemoryNode) {
		if let Some(parent) = self.nodes[child.0].parent.take() {
			self.nodes[parent].children.retain(|&c| c != child.0);
		}
	}

	fn element_mut(&mut self, node: MemoryNode) -> Option<(&mut BTreeMap<String, String>, &mut Option<String>, &mut Vec<(String, Listener<MemorySurface>)>)> {
		match &mut self.nodes[node.0].kind {
			Kind::Element {
				attributes, value, listeners, ..
			} => Some((attributes, value, listeners)),
			Kind::Text(_) | Kind::Raw(_) => None,
		}
	}
}

/// An in-memory surface. Clones share the same tree.
#[derive(Clone, Default)]
pub struct MemorySurface {
	arena: Rc<RefCell<Arena>>,
}

impl Debug for MemorySurface {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let arena = self.arena.borrow();
		f.debug_struct("MemorySurface")
			.field("nodes", &arena.nodes.len())
			.field("journal", &arena.journal.len())
			.finish()
	}
}

impl MemorySurface {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a detached container element. This is not journaled.
	#[must_use]
	pub fn create_root(&self) -> MemoryNode {
		self.arena.borrow_mut().push(Kind::Element {
			tag: "#root".to_owned(),
			attributes: BTreeMap::new(),
			value: None,
			listeners: Vec::new(),
		})
	}

	#[must_use]
	pub fn journal(&self) -> Vec<Mutation> {
		self.arena.borrow().journal.clone()
	}

	/// How many nodes were created, attached or not.
	#[must_use]
	pub fn node_count(&self) -> usize {
		self.arena.borrow().nodes.len()
	}

	/// Returns the journal and starts a new one.
	pub fn take_journal(&self) -> Vec<Mutation> {
		core::mem::take(&mut self.arena.borrow_mut().journal)
	}

	/// Serializes the children of `node`.
	#[must_use]
	pub fn inner_html(&self, node: MemoryNode) -> String {
		let arena = self.arena.borrow();
		let mut html = String::new();
		for &child in &arena.nodes[node.0].children {
			write_html(&arena, child, &mut html)
		}
		html
	}

	#[must_use]
	pub fn outer_html(&self, node: MemoryNode) -> String {
		let arena = self.arena.borrow();
		let mut html = String::new();
		write_html(&arena, node.0, &mut html);
		html
	}

	#[must_use]
	pub fn text_content(&self, node: MemoryNode) -> String {
		fn collect(arena: &Arena, node: usize, text: &mut String) {
			match &arena.nodes[node].kind {
				Kind::Text(value) => text.push_str(value),
				Kind::Raw(_) => (),
				Kind::Element { .. } => {
					for &child in &arena.nodes[node].children {
						collect(arena, child, text)
					}
				}
			}
		}
		let mut text = String::new();
		collect(&self.arena.borrow(), node.0, &mut text);
		text
	}

	#[must_use]
	pub fn tag(&self, node: MemoryNode) -> Option<String> {
		match &self.arena.borrow().nodes[node.0].kind {
			Kind::Element { tag, .. } => Some(tag.clone()),
			Kind::Text(_) | Kind::Raw(_) => None,
		}
	}

	#[must_use]
	pub fn attribute(&self, node: MemoryNode, name: &str) -> Option<String> {
		match &self.arena.borrow().nodes[node.0].kind {
			Kind::Element { attributes, .. } => attributes.get(name).cloned(),
			Kind::Text(_) | Kind::Raw(_) => None,
		}
	}

	#[must_use]
	pub fn listener_count(&self, node: MemoryNode) -> usize {
		match &self.arena.borrow().nodes[node.0].kind {
			Kind::Element { listeners, .. } => listeners.len(),
			Kind::Text(_) | Kind::Raw(_) => 0,
		}
	}

	/// All elements with the given tag below `root`, in document order.
	#[must_use]
	pub fn find_by_tag(&self, root: MemoryNode, tag: &str) -> Vec<MemoryNode> {
		fn walk(arena: &Arena, node: usize, tag: &str, found: &mut Vec<MemoryNode>) {
			for &child in &arena.nodes[node].children {
				if matches!(&arena.nodes[child].kind, Kind::Element { tag: t, .. } if t == tag) {
					found.push(MemoryNode(child))
				}
				walk(arena, child, tag, found)
			}
		}
		let mut found = Vec::new();
		walk(&self.arena.borrow(), root.0, tag, &mut found);
		found
	}

	/// Simulates the user editing a form control. This is not journaled.
	pub fn type_value(&self, node: MemoryNode, value: &str) {
		if let Some((_, live, _)) = self.arena.borrow_mut().element_mut(node) {
			*live = Some(value.to_owned())
		}
	}

	/// Invokes every listener for `event` on `node`, returning how many ran.
	///
	/// No arena borrow is held while listeners run, so they may freely cause re-renders.
	pub fn dispatch(&self, node: MemoryNode, event: &str) -> usize {
		let listeners: Vec<Listener<Self>> = match &self.arena.borrow().nodes[node.0].kind {
			Kind::Element { listeners, .. } => listeners.iter().filter(|(name, _)| name == event).map(|(_, listener)| Rc::clone(listener)).collect(),
			Kind::Text(_) | Kind::Raw(_) => Vec::new(),
		};
		trace!("Dispatching {:?} to {} listener(s).", event, listeners.len());
		let event = MemoryEvent {
			name: event.to_owned(),
			target: node,
		};
		for listener in &listeners {
			listener(&event)
		}
		listeners.len()
	}

	fn record(&self, mutation: Mutation) {
		self.arena.borrow_mut().journal.push(mutation)
	}
}

fn escape(text: &str, html: &mut String) {
	for c in text.chars() {
		match c {
			'&' => html.push_str("&amp;"),
			'<' => html.push_str("&lt;"),
			'>' => html.push_str("&gt;"),
			'"' => html.push_str("&quot;"),
			c => html.push(c),
		}
	}
}

fn write_html(arena: &Arena, node: usize, html: &mut String) {
	match &arena.nodes[node].kind {
		Kind::Text(text) => escape(text, html),
		Kind::Raw(markup) => html.push_str(markup),
		Kind::Element { tag, attributes, .. } => {
			html.push('<');
			html.push_str(tag);
			for (name, value) in attributes {
				html.push(' ');
				html.push_str(name);
				html.push_str("=\"");
				escape(value, html);
				html.push('"');
			}
			html.push('>');
			for &child in &arena.nodes[node].children {
				write_html(arena, child, html)
			}
			html.push_str("</");
			html.push_str(tag);
			html.push('>');
		}
	}
}

impl Surface for MemorySurface {
	type Node = MemoryNode;
	type Event = MemoryEvent;

	fn create_text(&self, value: &str) -> MemoryNode {
		let node = self.arena.borrow_mut().push(Kind::Text(value.to_owned()));
		self.record(Mutation::CreateText { node });
		node
	}

	fn set_text(&self, node: &MemoryNode, value: &str) {
		match &mut self.arena.borrow_mut().nodes[node.0].kind {
			Kind::Text(text) => *text = value.to_owned(),
			_ => return error!("Tried to set text of non-text node {:?}.", node),
		}
		self.record(Mutation::SetText {
			node: *node,
			value: value.to_owned(),
		})
	}

	fn create_raw(&self, markup: &str) -> MemoryNode {
		let node = self.arena.borrow_mut().push(Kind::Raw(markup.to_owned()));
		self.record(Mutation::CreateRaw { node });
		node
	}

	fn set_raw(&self, node: &MemoryNode, markup: &str) {
		match &mut self.arena.borrow_mut().nodes[node.0].kind {
			Kind::Raw(current) => *current = markup.to_owned(),
			_ => return error!("Tried to set markup of non-raw node {:?}.", node),
		}
		self.record(Mutation::SetRaw {
			node: *node,
			markup: markup.to_owned(),
		})
	}

	fn create_element(&self, tag: &str) -> MemoryNode {
		let node = self.arena.borrow_mut().push(Kind::Element {
			tag: tag.to_owned(),
			attributes: BTreeMap::new(),
			value: None,
			listeners: Vec::new(),
		});
		self.record(Mutation::CreateElement { node, tag: tag.to_owned() });
		node
	}

	fn set_attribute(&self, element: &MemoryNode, name: &str, value: &str) {
		match self.arena.borrow_mut().element_mut(*element) {
			Some((attributes, _, _)) => attributes.insert(name.to_owned(), value.to_owned()),
			None => return error!("Tried to set attribute {:?} on non-element {:?}.", name, element),
		};
		self.record(Mutation::SetAttribute {
			node: *element,
			name: name.to_owned(),
			value: value.to_owned(),
		})
	}

	fn remove_attribute(&self, element: &MemoryNode, name: &str) {
		match self.arena.borrow_mut().element_mut(*element) {
			Some((attributes, _, _)) => attributes.remove(name),
			None => return error!("Tried to remove attribute {:?} from non-element {:?}.", name, element),
		};
		self.record(Mutation::RemoveAttribute {
			node: *element,
			name: name.to_owned(),
		})
	}

	fn set_class_name(&self, element: &MemoryNode, value: &str) {
		match self.arena.borrow_mut().element_mut(*element) {
			Some((attributes, _, _)) => attributes.insert("class".to_owned(), value.to_owned()),
			None => return error!("Tried to set class name on non-element {:?}.", element),
		};
		self.record(Mutation::SetClassName {
			node: *element,
			value: value.to_owned(),
		})
	}

	fn live_value(&self, element: &MemoryNode) -> Option<String> {
		match &self.arena.borrow().nodes[element.0].kind {
			Kind::Element { value, .. } => Some(value.clone().unwrap_or_default()),
			Kind::Text(_) | Kind::Raw(_) => None,
		}
	}

	fn set_live_value(&self, element: &MemoryNode, value: &str) {
		match self.arena.borrow_mut().element_mut(*element) {
			Some((_, live, _)) => *live = Some(value.to_owned()),
			None => return error!("Tried to set value of non-element {:?}.", element),
		}
		self.record(Mutation::SetValue {
			node: *element,
			value: value.to_owned(),
		})
	}

	fn add_listener(&self, element: &MemoryNode, event: &str, listener: &Listener<Self>) {
		match self.arena.borrow_mut().element_mut(*element) {
			Some((_, _, listeners)) => listeners.push((event.to_owned(), Rc::clone(listener))),
			None => return error!("Tried to add {:?} listener to non-element {:?}.", event, element),
		}
		self.record(Mutation::AddListener {
			node: *element,
			event: event.to_owned(),
		})
	}

	fn remove_listener(&self, element: &MemoryNode, event: &str, listener: &Listener<Self>) {
		let address = listener_address::<Self>(listener);
		let removed = match self.arena.borrow_mut().element_mut(*element) {
			Some((_, _, listeners)) => listeners
				.iter()
				.position(|(name, l)| name == event && listener_address::<Self>(l) == address)
				.map(|i| listeners.remove(i))
				.is_some(),
			None => false,
		};
		if !removed {
			return error!("Tried to remove {:?} listener that isn't bound to {:?}.", event, element);
		}
		self.record(Mutation::RemoveListener {
			node: *element,
			event: event.to_owned(),
		})
	}

	fn append_child(&self, parent: &MemoryNode, child: &MemoryNode) {
		{
			let mut arena = self.arena.borrow_mut();
			arena.detach(*child);
			arena.nodes[child.0].parent = Some(parent.0);
			arena.nodes[parent.0].children.push(child.0);
		}
		self.record(Mutation::Append {
			parent: *parent,
			child: *child,
		})
	}

	fn insert_before(&self, parent: &MemoryNode, child: &MemoryNode, reference: &MemoryNode) {
		{
			let mut arena = self.arena.borrow_mut();
			arena.detach(*child);
			let index = match arena.nodes[parent.0].children.iter().position(|&c| c == reference.0) {
				Some(index) => index,
				None => {
					error!("Reference node {:?} is not a child of {:?}. Appending instead.", reference, parent);
					arena.nodes[parent.0].children.len()
				}
			};
			arena.nodes[child.0].parent = Some(parent.0);
			arena.nodes[parent.0].children.insert(index, child.0);
		}
		self.record(Mutation::InsertBefore {
			parent: *parent,
			child: *child,
			reference: *reference,
		})
	}

	fn replace_child(&self, parent: &MemoryNode, new: &MemoryNode, old: &MemoryNode) {
		{
			let mut arena = self.arena.borrow_mut();
			let index = match arena.nodes[parent.0].children.iter().position(|&c| c == old.0) {
				Some(index) => index,
				None => return error!("Tried to replace {:?}, which is not a child of {:?}.", old, parent),
			};
			arena.detach(*new);
			arena.nodes[old.0].parent = None;
			arena.nodes[new.0].parent = Some(parent.0);
			arena.nodes[parent.0].children[index] = new.0;
		}
		self.record(Mutation::Replace {
			parent: *parent,
			new: *new,
			old: *old,
		})
	}

	fn remove_child(&self, parent: &MemoryNode, child: &MemoryNode) {
		{
			let mut arena = self.arena.borrow_mut();
			if arena.nodes[child.0].parent != Some(parent.0) {
				return error!("Tried to remove {:?}, which is not a child of {:?}.", child, parent);
			}
			arena.detach(*child);
		}
		self.record(Mutation::Remove {
			parent: *parent,
			child: *child,
		})
	}

	fn parent(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.arena.borrow().nodes[node.0].parent.map(MemoryNode)
	}

	fn child_nodes(&self, parent: &MemoryNode) -> Vec<MemoryNode> {
		self.arena.borrow().nodes[parent.0].children.iter().copied().map(MemoryNode).collect()
	}
}
