//! Path-based selection of the mounted root component.
//!
//! Routes are matched exactly first, then as `:param` patterns in registration order.
//! Unmatched paths fall back to the `*` route if there is one, and to a built-in "not found" page otherwise.

use crate::{
	builder::Ui,
	component::{AnyComponent, Component, NavEntry},
	error::MountError,
	scheduler::Scheduler,
	surface::Surface,
};
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
};
use std::{
	cell::RefCell,
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span};

type Factory<S> = Rc<dyn Fn(&NavEntry) -> Box<dyn AnyComponent<S>>>;

/// Runs before every navigation. Navigation continues only if the hook calls `proceed`.
pub type NavigationHook = Rc<dyn Fn(&NavEntry, &NavEntry, &mut dyn FnMut())>;

struct Route<S: Surface> {
	pattern: String,
	factory: Factory<S>,
}

struct Inner<S: Surface> {
	scheduler: Scheduler<S>,
	routes: RefCell<Vec<Route<S>>>,
	hook: RefCell<Option<NavigationHook>>,
	container: RefCell<Option<S::Node>>,
	current: RefCell<NavEntry>,
	navigations: Cell<usize>,
}

/// Mounts one of several root components depending on a path.
///
/// Clones share the same state. Hooks that navigate should hold a [`WeakRouter`].
pub struct Router<S: Surface>(Rc<Inner<S>>);

impl<S: Surface> Clone for Router<S> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<S: Surface> Debug for Router<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("routes", &self.0.routes.borrow().iter().map(|route| route.pattern.clone()).collect::<Vec<_>>())
			.field("current", &*self.0.current.borrow())
			.field("mounted", &self.is_mounted())
			.finish()
	}
}

/// The page shown for unmatched paths when there is no `*` route.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl<S: Surface> Component<S> for NotFound {
	fn render(&mut self, ui: &mut Ui<'_, S>) {
		ui.div(|div| div.text("404 Not Found"))
	}
}

impl<S: Surface> Router<S> {
	#[must_use]
	pub fn new(scheduler: Scheduler<S>) -> Self {
		Self(Rc::new(Inner {
			scheduler,
			routes: RefCell::new(Vec::new()),
			hook: RefCell::new(None),
			container: RefCell::new(None),
			current: RefCell::new(NavEntry {
				route: String::new(),
				path: "/".to_owned(),
				params: BTreeMap::new(),
				query: BTreeMap::new(),
			}),
			navigations: Cell::new(0),
		}))
	}

	/// Registers `factory` for `pattern`, replacing an earlier route with the same pattern.
	///
	/// `pattern` is a literal path, a path with `:name` segments, or `*`.
	#[must_use]
	pub fn route<C: Component<S>>(self, pattern: impl Into<String>, factory: impl Fn(&NavEntry) -> C + 'static) -> Self {
		let pattern = pattern.into();
		let factory: Factory<S> = Rc::new(move |nav: &NavEntry| Box::new(factory(nav)) as Box<dyn AnyComponent<S>>);
		{
			let mut routes = self.0.routes.borrow_mut();
			match routes.iter_mut().find(|route| route.pattern == pattern) {
				Some(route) => route.factory = factory,
				None => routes.push(Route { pattern, factory }),
			}
		}
		self
	}

	#[must_use]
	pub fn before_navigate(self, hook: impl Fn(&NavEntry, &NavEntry, &mut dyn FnMut()) + 'static) -> Self {
		*self.0.hook.borrow_mut() = Some(Rc::new(hook));
		self
	}

	/// Sets the path [`Router::mount`] starts at. The default is `/`.
	#[must_use]
	pub fn initial_path(self, path: impl Into<String>) -> Self {
		let path = path.into();
		*self.0.current.borrow_mut() = nav_entry(&path, String::new(), BTreeMap::new());
		self
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakRouter<S> {
		WeakRouter(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler<S> {
		&self.0.scheduler
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.0.container.borrow().is_some()
	}

	/// The full path of the current (or initial) location.
	#[must_use]
	pub fn current_path(&self) -> String {
		self.0.current.borrow().path.clone()
	}

	#[must_use]
	pub fn current(&self) -> NavEntry {
		self.0.current.borrow().clone()
	}

	/// How many navigations were committed.
	#[must_use]
	pub fn navigation_count(&self) -> usize {
		self.0.navigations.get()
	}

	/// Finds the route for `path`, without falling back to `*`.
	#[must_use]
	pub fn resolve(&self, path: &str) -> Option<NavEntry> {
		self.find(path).map(|(_, entry)| entry)
	}

	fn find(&self, path: &str) -> Option<(Factory<S>, NavEntry)> {
		let routes = self.0.routes.borrow();
		let path_part = path.split('?').next().unwrap_or_default();

		if let Some(route) = routes.iter().find(|route| route.pattern == path_part) {
			return Some((Rc::clone(&route.factory), nav_entry(path, route.pattern.clone(), BTreeMap::new())));
		}

		routes
			.iter()
			.filter(|route| route.pattern.contains(':'))
			.find_map(|route| match_pattern(&route.pattern, path_part).map(|params| (Rc::clone(&route.factory), nav_entry(path, route.pattern.clone(), params))))
	}

	/// Like [`Router::find`], falling back to `*` and then [`NotFound`].
	fn find_or_fallback(&self, path: &str) -> (bool, Factory<S>, NavEntry) {
		if let Some((factory, entry)) = self.find(path) {
			return (true, factory, entry);
		}
		trace!("No route for {:?}. Falling back.", path);
		let wildcard = self.0.routes.borrow().iter().find(|route| route.pattern == "*").map(|route| Rc::clone(&route.factory));
		let factory: Factory<S> = match wildcard {
			Some(factory) => factory,
			None => Rc::new(|_: &NavEntry| Box::new(NotFound) as Box<dyn AnyComponent<S>>),
		};
		(false, factory, nav_entry(path, "*".to_owned(), BTreeMap::new()))
	}

	/// Runs the hook chain for a navigation to `to`, returning whether it was approved.
	///
	/// The router-level hook runs first. Its `proceed` runs the destination component's
	/// [`before_navigate`](`Component::before_navigate`), whose own `proceed` approves.
	fn approve(&self, from: &NavEntry, to: &NavEntry, component: &mut dyn AnyComponent<S>) -> bool {
		let approved = Cell::new(false);
		let hook = self.0.hook.borrow().clone();
		let mut proceed_to_component = || component.navigating(from, to, &mut || approved.set(true));
		match hook {
			Some(hook) => hook(from, to, &mut proceed_to_component),
			None => proceed_to_component(),
		}
		approved.get()
	}

	/// Mounts the route for the current path into `target`.
	///
	/// If the matched route's hooks don't proceed, nothing is rendered yet,
	/// but the router is mounted and can be [navigated](`Router::navigate`).
	///
	/// # Errors
	///
	/// [`MountError::MissingTarget`] iff `target` is [`None`].
	#[instrument(skip(self))]
	pub fn mount(&self, target: Option<S::Node>) -> Result<(), MountError> {
		let container = target.ok_or_else(|| {
			error!("Tried to mount a router to a missing target.");
			MountError::MissingTarget
		})?;
		*self.0.container.borrow_mut() = Some(container.clone());

		let path = self.current_path();
		let (matched, factory, entry) = self.find_or_fallback(&path);
		let mut component = factory(&entry);
		if matched && !self.approve(&self.current(), &entry, &mut *component) {
			trace!("Initial navigation to {:?} was not approved.", path);
			return Ok(());
		}
		*self.0.current.borrow_mut() = entry.clone();
		self.0.scheduler.mount_erased(container, component, entry);
		Ok(())
	}

	/// Navigates to `path`, replacing the mounted root.
	///
	/// Returns `false` if the router isn't mounted or a hook didn't proceed.
	/// A hook may redirect by navigating elsewhere itself instead of proceeding.
	#[instrument(skip(self))]
	pub fn navigate(&self, path: &str) -> bool {
		let container = match self.0.container.borrow().clone() {
			Some(container) => container,
			None => {
				error!("Tried to navigate before the router was mounted.");
				return false;
			}
		};

		let from = self.current();
		let (_, factory, to) = self.find_or_fallback(path);
		let mut component = factory(&to);
		if !self.approve(&from, &to, &mut *component) {
			trace!("Navigation from {:?} to {:?} was not approved.", from.path, path);
			return false;
		}

		let span = trace_span!("Navigating", from = from.path.as_str(), to = path);
		let _enter = span.enter();
		*self.0.current.borrow_mut() = to.clone();
		self.0.navigations.set(self.0.navigations.get() + 1);
		self.0.scheduler.mount_erased(container, component, to);
		true
	}
}

/// A [`Router`] handle that doesn't keep it alive.
pub struct WeakRouter<S: Surface>(Weak<Inner<S>>);

impl<S: Surface> Clone for WeakRouter<S> {
	fn clone(&self) -> Self {
		Self(Weak::clone(&self.0))
	}
}

impl<S: Surface> WeakRouter<S> {
	#[must_use]
	pub fn upgrade(&self) -> Option<Router<S>> {
		self.0.upgrade().map(Router)
	}

	/// Navigates if the router is still alive.
	pub fn navigate(&self, path: &str) -> bool {
		self.upgrade().map_or(false, |router| router.navigate(path))
	}
}

fn nav_entry(path: &str, route: String, params: BTreeMap<String, String>) -> NavEntry {
	NavEntry {
		route,
		path: path.to_owned(),
		params,
		query: parse_query(path),
	}
}

/// Matches `path` against a pattern with `:name` segments, returning the captured segments.
fn match_pattern(pattern: &str, path: &str) -> Option<BTreeMap<String, String>> {
	let mut params = BTreeMap::new();
	let mut pattern_segments = pattern.split('/');
	let mut path_segments = path.split('/');
	loop {
		match (pattern_segments.next(), path_segments.next()) {
			(None, None) => return Some(params),
			(Some(expected), Some(actual)) => {
				if let Some(name) = expected.strip_prefix(':') {
					if actual.is_empty() {
						return None;
					}
					params.insert(name.to_owned(), actual.to_owned());
				} else if expected != actual {
					return None;
				}
			}
			_ => return None,
		}
	}
}

/// Parses `a=b&c=d` after the first `?`. Pairs without exactly one `=` are skipped.
fn parse_query(path: &str) -> BTreeMap<String, String> {
	let mut query = BTreeMap::new();
	let query_part = match path.split('?').nth(1) {
		Some(query_part) => query_part,
		None => return query,
	};
	for pair in query_part.split('&') {
		let mut parts = pair.split('=');
		if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
			query.insert(key.to_owned(), value.to_owned());
		}
	}
	query
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn patterns() {
		let params = match_pattern("/user/:id/posts/:post", "/user/7/posts/42").unwrap();
		assert_eq!(params.get("id").map(String::as_str), Some("7"));
		assert_eq!(params.get("post").map(String::as_str), Some("42"));

		assert!(match_pattern("/user/:id", "/user/7/posts").is_none());
		assert!(match_pattern("/user/:id", "/user/").is_none());
		assert!(match_pattern("/user/:id", "/users/7").is_none());
		assert_eq!(match_pattern("/about", "/about"), Some(BTreeMap::new()));
	}

	#[test]
	fn queries() {
		let query = parse_query("/search?q=rust&page=2&flag&a=b=c");
		assert_eq!(query.len(), 2);
		assert_eq!(query.get("q").map(String::as_str), Some("rust"));
		assert_eq!(query.get("page").map(String::as_str), Some("2"));
		assert!(parse_query("/search").is_empty());
	}
}
