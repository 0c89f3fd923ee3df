//! The live presentation tree the reconciler patches.

use crate::node::Listener;
use core::fmt::Debug;

/// A mutable presentation tree, like the DOM.
///
/// All methods take `&self`: implementations are cheap shared handles,
/// since exit transitions complete later and keep a clone around to finish removals.
///
/// Failures of the underlying platform are expected to be logged by the implementation.
/// The reconciler treats every operation as infallible and keeps going.
pub trait Surface: Clone + 'static {
	type Node: Clone + PartialEq + Debug + 'static;
	type Event: 'static;

	fn create_text(&self, value: &str) -> Self::Node;
	fn set_text(&self, node: &Self::Node, value: &str);

	/// Creates a host for pre-parsed markup.
	fn create_raw(&self, markup: &str) -> Self::Node;
	fn set_raw(&self, node: &Self::Node, markup: &str);

	fn create_element(&self, tag: &str) -> Self::Node;
	fn set_attribute(&self, element: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&self, element: &Self::Node, name: &str);

	/// Assigns the class list as a property rather than through the generic attribute path.
	fn set_class_name(&self, element: &Self::Node, value: &str);

	/// The current (possibly user-edited) value of a form control, or [`None`] for other nodes.
	fn live_value(&self, element: &Self::Node) -> Option<String>;
	fn set_live_value(&self, element: &Self::Node, value: &str);

	fn add_listener(&self, element: &Self::Node, event: &str, listener: &Listener<Self>);
	fn remove_listener(&self, element: &Self::Node, event: &str, listener: &Listener<Self>);

	fn append_child(&self, parent: &Self::Node, child: &Self::Node);
	fn insert_before(&self, parent: &Self::Node, child: &Self::Node, reference: &Self::Node);
	fn replace_child(&self, parent: &Self::Node, new: &Self::Node, old: &Self::Node);
	fn remove_child(&self, parent: &Self::Node, child: &Self::Node);

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	fn child_nodes(&self, parent: &Self::Node) -> Vec<Self::Node>;

	/// Called once at the end of each render pass.
	fn flush(&self) {}
}
