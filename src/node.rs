//! The intermediate tree one render pass produces.
//!
//! A [`Node`] tree is built front to back by a [`Ui`](`crate::builder::Ui`) and is never mutated afterwards.
//! Once committed, it becomes the "old" side of the next diff for the same container.

use crate::surface::Surface;
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::{borrow::Cow, collections::BTreeMap, rc::Rc};

/// An event callback attached to a live element.
///
/// Listeners are compared by identity (the address of the shared closure), never by behaviour.
pub type Listener<S> = Rc<dyn Fn(&<S as Surface>::Event)>;

pub(crate) fn listener_address<S: Surface>(listener: &Listener<S>) -> usize {
	Rc::as_ptr(listener).cast::<()>() as usize
}

/// One node of a render pass' output.
pub enum Node<S: Surface> {
	/// A text leaf.
	Text(String),
	/// Pre-parsed markup that is inserted as-is. No escaping takes place.
	Raw(String),
	/// An element with attributes, listeners, directives, children and optional transitions.
	Element(Element<S>),
}

impl<S: Surface> Node<S> {
	#[must_use]
	pub fn as_element(&self) -> Option<&Element<S>> {
		match self {
			Node::Element(element) => Some(element),
			Node::Text(_) | Node::Raw(_) => None,
		}
	}

	/// Returns the text of a [`Node::Text`].
	#[must_use]
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Node::Text(text) => Some(text),
			Node::Raw(_) | Node::Element(_) => None,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Node::Text(_) => "text",
			Node::Raw(_) => "raw markup",
			Node::Element(_) => "element",
		}
	}

	/// Concatenated text of this node and all its descendants, skipping raw markup.
	#[must_use]
	pub fn text_content(&self) -> String {
		let mut text = String::new();
		self.collect_text(&mut text);
		text
	}

	fn collect_text(&self, text: &mut String) {
		match self {
			Node::Text(value) => text.push_str(value),
			Node::Raw(_) => (),
			Node::Element(element) => {
				for child in &element.children {
					child.collect_text(text)
				}
			}
		}
	}
}

impl<S: Surface> Clone for Node<S> {
	fn clone(&self) -> Self {
		match self {
			Node::Text(text) => Node::Text(text.clone()),
			Node::Raw(markup) => Node::Raw(markup.clone()),
			Node::Element(element) => Node::Element(element.clone()),
		}
	}
}

impl<S: Surface> Debug for Node<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Node::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Node::Raw(markup) => f.debug_tuple("Raw").field(markup).finish(),
			Node::Element(element) => element.fmt(f),
		}
	}
}

/// An element node.
pub struct Element<S: Surface> {
	pub tag: Cow<'static, str>,
	pub attributes: BTreeMap<Cow<'static, str>, String>,
	pub listeners: HashMap<Cow<'static, str>, Listener<S>>,
	pub directives: Vec<Rc<dyn Directive<S>>>,
	pub children: Vec<Node<S>>,
	/// Started once, right after the element is first attached.
	pub enter: Option<Rc<dyn Transition<S>>>,
	/// Started on removal. The live element is detached only once it completes.
	pub exit: Option<Rc<dyn Transition<S>>>,
}

impl<S: Surface> Element<S> {
	#[must_use]
	pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
		Self {
			tag: tag.into(),
			attributes: BTreeMap::new(),
			listeners: HashMap::new(),
			directives: Vec::new(),
			children: Vec::new(),
			enter: None,
			exit: None,
		}
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}
}

impl<S: Surface> Clone for Element<S> {
	fn clone(&self) -> Self {
		Self {
			tag: self.tag.clone(),
			attributes: self.attributes.clone(),
			listeners: self.listeners.clone(),
			directives: self.directives.clone(),
			children: self.children.clone(),
			enter: self.enter.clone(),
			exit: self.exit.clone(),
		}
	}
}

impl<S: Surface> Debug for Element<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Element")
			.field("tag", &self.tag)
			.field("attributes", &self.attributes)
			.field("listeners", &self.listeners.keys().collect::<Vec<_>>())
			.field("directives", &self.directives.len())
			.field("children", &self.children)
			.field("enter", &self.enter.is_some())
			.field("exit", &self.exit.is_some())
			.finish()
	}
}

/// Imperative access to a live element, for integrating code that needs the real thing.
///
/// [`apply`](`Directive::apply`) runs when the element is created and again on every patch, so it should be idempotent.
/// [`dispose`](`Directive::dispose`) runs once, when the element is detached from the surface.
pub trait Directive<S: Surface> {
	fn apply(&self, surface: &S, element: &S::Node);

	fn dispose(&self, surface: &S, element: &S::Node) {
		let _ = (surface, element);
	}
}

pub(crate) struct DirectiveFn<F>(pub F);
impl<S: Surface, F: Fn(&S, &S::Node)> Directive<S> for DirectiveFn<F> {
	fn apply(&self, surface: &S, element: &S::Node) {
		(self.0)(surface, element)
	}
}

/// Which side of an element's lifetime a [`Transition`] is started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Enter,
	Exit,
}

/// A (usually timed) visual effect run when an element is attached or before it is detached.
///
/// For [`Phase::Exit`], the element stays on the surface until `on_complete` is called.
/// For [`Phase::Enter`], `on_complete` may be ignored.
pub trait Transition<S: Surface> {
	fn start(&self, phase: Phase, surface: &S, element: &S::Node, on_complete: Box<dyn FnOnce()>);
}
