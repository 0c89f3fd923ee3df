//! Drives render passes: build, diff, lifecycle, commit.
//!
//! Any state change of a mounted component re-renders the whole mounted tree.
//! Requests made while a pass is running are folded into one more pass right after it.

use crate::{
	builder::Ui,
	component::{AnyComponent, Component, Instance, InstanceId, NavEntry},
	diff::Reconciler,
	error::MountError,
	inspect::{Inspector, TracingInspector},
	node::Node,
	surface::Surface,
};
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashSet;
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span, warn};

/// The last committed [`Node`] list of each container.
///
/// There is at most one entry per container.
struct MountRegistry<S: Surface>(Vec<(S::Node, Vec<Node<S>>)>);

impl<S: Surface> MountRegistry<S> {
	fn take(&mut self, container: &S::Node) -> Vec<Node<S>> {
		match self.0.iter().position(|(c, _)| c == container) {
			Some(index) => self.0.swap_remove(index).1,
			None => Vec::new(),
		}
	}

	fn commit(&mut self, container: S::Node, nodes: Vec<Node<S>>) {
		match self.0.iter_mut().find(|(c, _)| *c == container) {
			Some((_, committed)) => {
				warn!("Container {:?} was committed to concurrently. Overwriting.", container);
				*committed = nodes
			}
			None => self.0.push((container, nodes)),
		}
	}

	fn get(&self, container: &S::Node) -> Option<&[Node<S>]> {
		self.0.iter().find(|(c, _)| c == container).map(|(_, nodes)| nodes.as_slice())
	}
}

struct Root<S: Surface> {
	container: S::Node,
	instance: Rc<Instance<S>>,
}

struct Inner<S: Surface> {
	reconciler: Reconciler<S>,
	inspector: RefCell<Rc<dyn Inspector>>,
	root: RefCell<Option<Root<S>>>,
	/// Containers whose committed tree must be torn down before the next pass.
	stale: RefCell<Vec<S::Node>>,
	registry: RefCell<MountRegistry<S>>,
	/// Instances reached during the last committed pass, in reach order.
	active: RefCell<Vec<Rc<Instance<S>>>>,
	next_id: Rc<Cell<u64>>,
	rendering: Cell<bool>,
	pending: Cell<bool>,
	passes: Cell<usize>,
}

/// Owns one mounted component tree and re-renders it on request.
///
/// Clones share the same tree. Components hold [`WeakScheduler`]s only.
pub struct Scheduler<S: Surface>(Rc<Inner<S>>);

impl<S: Surface> Clone for Scheduler<S> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<S: Surface> Debug for Scheduler<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("mounted", &self.is_mounted())
			.field("active", &self.active_count())
			.field("rendering", &self.0.rendering.get())
			.field("passes", &self.0.passes.get())
			.finish()
	}
}

/// Releases the "rendering" flag even if a render panics.
struct RenderGuard<'a>(&'a Cell<bool>);

impl<'a> RenderGuard<'a> {
	fn new(rendering: &'a Cell<bool>) -> Self {
		rendering.set(true);
		Self(rendering)
	}
}

impl Drop for RenderGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false)
	}
}

impl<S: Surface> Scheduler<S> {
	#[must_use]
	pub fn new(surface: S) -> Self {
		Self(Rc::new(Inner {
			reconciler: Reconciler::new(surface),
			inspector: RefCell::new(Rc::new(TracingInspector)),
			root: RefCell::new(None),
			stale: RefCell::new(Vec::new()),
			registry: RefCell::new(MountRegistry(Vec::new())),
			active: RefCell::new(Vec::new()),
			next_id: Rc::new(Cell::new(0)),
			rendering: Cell::new(false),
			pending: Cell::new(false),
			passes: Cell::new(0),
		}))
	}

	/// Limits how deeply nested elements are reconciled. The default is [`Reconciler::DEFAULT_DEPTH_LIMIT`].
	#[must_use]
	pub fn with_depth_limit(self, depth_limit: usize) -> Self {
		self.0.reconciler.set_depth_limit(depth_limit);
		self
	}

	/// Replaces the default [`TracingInspector`].
	#[must_use]
	pub fn with_inspector(self, inspector: Rc<dyn Inspector>) -> Self {
		*self.0.inspector.borrow_mut() = inspector;
		self
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakScheduler<S> {
		WeakScheduler(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn surface(&self) -> &S {
		self.0.reconciler.surface()
	}

	#[must_use]
	pub fn inspector(&self) -> Rc<dyn Inspector> {
		Rc::clone(&self.0.inspector.borrow())
	}

	/// Mounts `root` into `target` and renders it.
	///
	/// A tree that was mounted before is torn down first.
	///
	/// # Errors
	///
	/// [`MountError::MissingTarget`] iff `target` is [`None`]. Nothing is constructed or rendered in that case.
	#[instrument(skip(self, root))]
	pub fn mount<C: Component<S>>(&self, target: Option<S::Node>, root: C) -> Result<(), MountError> {
		let container = target.ok_or_else(|| {
			error!("Tried to mount to a missing target.");
			MountError::MissingTarget
		})?;
		self.install(container, Box::new(root), None);
		Ok(())
	}

	/// Like [`Scheduler::mount`], with a navigation entry readable through [`Ui::nav`].
	pub(crate) fn mount_erased(&self, container: S::Node, root: Box<dyn AnyComponent<S>>, nav: NavEntry) {
		self.install(container, root, Some(Rc::new(nav)))
	}

	/// Swaps the mounted root for `root`, clearing its container first.
	///
	/// Returns `false` (and does nothing) if nothing is mounted.
	pub fn replace_root<C: Component<S>>(&self, root: C, nav: Option<NavEntry>) -> bool {
		let container = match &*self.0.root.borrow() {
			Some(root) => root.container.clone(),
			None => return false,
		};
		self.install(container, Box::new(root), nav.map(Rc::new));
		true
	}

	fn install(&self, container: S::Node, root: Box<dyn AnyComponent<S>>, nav: Option<Rc<NavEntry>>) {
		let id = self.allocate_id();
		let instance = Instance::new(id, None, root, nav);
		trace!(%id, name = instance.name, "Installing root.");
		let previous = self.0.root.replace(Some(Root { container, instance }));
		if let Some(previous) = previous {
			self.0.stale.borrow_mut().push(previous.container)
		}
		self.request_render()
	}

	/// Tears down the mounted tree, if any.
	pub fn unmount(&self) {
		let previous = self.0.root.borrow_mut().take();
		match previous {
			Some(previous) => {
				self.0.stale.borrow_mut().push(previous.container);
				self.request_render()
			}
			None => trace!("Nothing mounted. Ignoring unmount."),
		}
	}

	fn allocate_id(&self) -> InstanceId {
		allocate(&self.0.next_id)
	}

	/// Re-renders the mounted tree.
	///
	/// Does nothing if nothing is mounted.
	/// While a pass is running, only marks that another one is needed.
	pub fn request_render(&self) {
		if self.0.rendering.get() {
			trace!("Render requested during a pass. Deferring.");
			return self.0.pending.set(true);
		}
		if self.0.root.borrow().is_none() && self.0.stale.borrow().is_empty() {
			return trace!("Nothing mounted. Ignoring render request.");
		}

		let _guard = RenderGuard::new(&self.0.rendering);
		loop {
			self.0.pending.set(false);
			self.clear_stale();

			let root = self.0.root.borrow().as_ref().map(|root| (root.container.clone(), Rc::clone(&root.instance)));
			match root {
				Some((container, instance)) => self.render_pass(&container, &instance),
				None => {
					self.retire(&HashSet::new());
					self.0.reconciler.surface().flush()
				}
			}

			if !self.0.pending.get() {
				break;
			}
		}
	}

	/// Tears down the committed trees of containers that lost their root.
	fn clear_stale(&self) {
		let stale: Vec<_> = self.0.stale.borrow_mut().drain(..).collect();
		for container in stale {
			let span = trace_span!("Clearing container", ?container);
			let _enter = span.enter();
			let committed = self.0.registry.borrow_mut().take(&container);
			self.0.reconciler.update_child_nodes(&container, &committed, &[]);
		}
	}

	#[instrument(skip(self, instance), fields(root = %instance.id))]
	fn render_pass(&self, container: &S::Node, instance: &Rc<Instance<S>>) {
		let pass_number = self.0.passes.get() + 1;
		self.0.passes.set(pass_number);
		trace!(pass_number, "Starting render pass.");

		let mut pass = Pass {
			scheduler: self.downgrade(),
			next_id: Rc::clone(&self.0.next_id),
			reached: Vec::new(),
			reached_ids: HashSet::new(),
		};
		let nodes = pass.render(instance);

		let committed = self.0.registry.borrow_mut().take(container);
		self.0.reconciler.update_child_nodes(container, &committed, &nodes);

		self.retire(&pass.reached_ids);
		let inspector = self.inspector();
		for instance in &pass.reached {
			instance.mount(&*inspector)
		}
		*self.0.active.borrow_mut() = pass.reached;

		self.0.registry.borrow_mut().commit(container.clone(), nodes);
		self.0.reconciler.surface().flush();
	}

	/// Unmounts previously active instances that aren't in `reached`.
	fn retire(&self, reached: &HashSet<InstanceId>) {
		let previous = core::mem::take(&mut *self.0.active.borrow_mut());
		let inspector = self.inspector();
		for instance in previous.iter().filter(|instance| !reached.contains(&instance.id)) {
			instance.unmount(&*inspector)
		}
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.0.root.borrow().is_some()
	}

	#[must_use]
	pub fn is_rendering(&self) -> bool {
		self.0.rendering.get()
	}

	/// How many instances were reached by the last pass.
	#[must_use]
	pub fn active_count(&self) -> usize {
		self.0.active.borrow().len()
	}

	/// How many render passes ran so far.
	#[must_use]
	pub fn render_count(&self) -> usize {
		self.0.passes.get()
	}

	/// Whether the instance with `id` is mounted right now.
	#[must_use]
	pub fn is_active(&self, id: InstanceId) -> bool {
		self.0.active.borrow().iter().any(|instance| instance.id == id && instance.is_mounted())
	}

	/// Runs `f` on the last committed tree of the mounted container.
	pub fn with_committed<R>(&self, f: impl FnOnce(&[Node<S>]) -> R) -> R {
		let root = self.0.root.borrow();
		let registry = self.0.registry.borrow();
		f(root.as_ref().and_then(|root| registry.get(&root.container)).unwrap_or(&[]))
	}
}

/// A [`Scheduler`] handle that doesn't keep the tree alive.
pub struct WeakScheduler<S: Surface>(Weak<Inner<S>>);

impl<S: Surface> Clone for WeakScheduler<S> {
	fn clone(&self) -> Self {
		Self(Weak::clone(&self.0))
	}
}

impl<S: Surface> Debug for WeakScheduler<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WeakScheduler").field(&self.0.strong_count()).finish()
	}
}

impl<S: Surface> WeakScheduler<S> {
	#[must_use]
	pub fn upgrade(&self) -> Option<Scheduler<S>> {
		self.0.upgrade().map(Scheduler)
	}

	/// Requests a render if the scheduler is still alive.
	pub fn request_render(&self) {
		if let Some(scheduler) = self.upgrade() {
			scheduler.request_render()
		}
	}
}

fn allocate(next_id: &Cell<u64>) -> InstanceId {
	let id = next_id.get();
	next_id.set(id + 1);
	InstanceId(id)
}

/// Bookkeeping of one render pass.
pub(crate) struct Pass<S: Surface> {
	scheduler: WeakScheduler<S>,
	next_id: Rc<Cell<u64>>,
	reached: Vec<Rc<Instance<S>>>,
	reached_ids: HashSet<InstanceId>,
}

impl<S: Surface> Pass<S> {
	pub(crate) fn scheduler(&self) -> &WeakScheduler<S> {
		&self.scheduler
	}

	pub(crate) fn allocate_id(&mut self) -> InstanceId {
		allocate(&self.next_id)
	}

	fn reach(&mut self, instance: &Rc<Instance<S>>) {
		if self.reached_ids.insert(instance.id) {
			self.reached.push(Rc::clone(instance))
		} else {
			warn!(id = %instance.id, name = instance.name, "Instance reached more than once in one pass.")
		}
	}

	/// Renders `instance` with fresh cursors and returns its output.
	pub(crate) fn render(&mut self, instance: &Rc<Instance<S>>) -> Vec<Node<S>> {
		self.reach(instance);
		let span = trace_span!("Rendering", id = %instance.id, name = instance.name);
		let _enter = span.enter();

		instance.slots.borrow_mut().begin_render();
		let mut ui = Ui::new(self, Rc::clone(instance));
		instance.component.borrow_mut().render_erased(&mut ui);
		let nodes = ui.into_nodes();
		instance.slots.borrow_mut().end_render();
		nodes
	}
}
