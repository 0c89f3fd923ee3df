use std::{
	cell::{Cell, RefCell},
	collections::BTreeMap,
	rc::Rc,
};
use tracing::Level;
use xylem::{Action, Component, Inspector, InstanceId, MemoryNode, MemorySurface, MountError, Scheduler, State, Store, Ui};

fn init_log() {
	let _ = tracing_subscriber::fmt().with_max_level(Level::TRACE).with_test_writer().try_init();
}

type Handle<T> = Rc<RefCell<Option<State<T>>>>;

fn grab<T>(handle: &Handle<T>) -> State<T> {
	handle.borrow().clone().expect("Component wasn't rendered yet.")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
	Mounted(InstanceId, String),
	Unmounted(InstanceId),
	StateChanged(InstanceId, usize, String, String),
}

#[derive(Default)]
struct Recorder(RefCell<Vec<Event>>);

impl Recorder {
	fn take(&self) -> Vec<Event> {
		self.0.borrow_mut().drain(..).collect()
	}

	/// Like [`Recorder::take`], without state changes.
	fn lifecycle(&self) -> Vec<Event> {
		self.take().into_iter().filter(|event| !matches!(event, Event::StateChanged(..))).collect()
	}
}

impl Inspector for Recorder {
	fn component_mounted(&self, id: InstanceId, name: &str) {
		self.0.borrow_mut().push(Event::Mounted(id, name.to_owned()))
	}

	fn component_unmounted(&self, id: InstanceId) {
		self.0.borrow_mut().push(Event::Unmounted(id))
	}

	fn state_changed(&self, id: InstanceId, slot: usize, name: &str, value: &str) {
		self.0.borrow_mut().push(Event::StateChanged(id, slot, name.to_owned(), value.to_owned()))
	}
}

fn recorded<C: Component<MemorySurface>>(root: C) -> (MemorySurface, MemoryNode, Scheduler<MemorySurface>, Rc<Recorder>) {
	let surface = MemorySurface::new();
	let container = surface.create_root();
	let recorder = Rc::new(Recorder::default());
	let scheduler = Scheduler::new(surface.clone()).with_inspector(Rc::clone(&recorder) as Rc<dyn Inspector>);
	scheduler.mount(Some(container), root).unwrap();
	(surface, container, scheduler, recorder)
}

struct Clicks;
impl Component<MemorySurface> for Clicks {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let clicks = ui.state_named("clicks", 0_u32);
		let value = clicks.get();
		ui.button(|button| {
			button.on("click", move |_| {
				clicks.update(|clicks| clicks + 1);
			});
			button.text(value.to_string());
		})
	}
}

struct Page {
	tick: Handle<u32>,
	children: Rc<RefCell<Vec<InstanceId>>>,
}
impl Component<MemorySurface> for Page {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let tick = ui.state(0_u32);
		*self.tick.borrow_mut() = Some(tick.clone());
		let children = Rc::clone(&self.children);
		ui.section(|section| {
			section.h1(|h1| h1.text(format!("tick {}", tick.get())));
			children.borrow_mut().push(section.child(Clicks));
		})
	}
}

#[test]
fn child_state_survives_parent_renders() {
	init_log();
	let tick: Handle<u32> = Handle::default();
	let children = Rc::new(RefCell::new(Vec::new()));
	let (surface, container, scheduler, _recorder) = recorded(Page {
		tick: Rc::clone(&tick),
		children: Rc::clone(&children),
	});

	let button = surface.find_by_tag(container, "button")[0];
	surface.dispatch(button, "click");
	surface.dispatch(button, "click");
	grab(&tick).set(1);

	assert_eq!(surface.text_content(container), "tick 12");
	assert_eq!(surface.find_by_tag(container, "button"), vec![button]);
	assert_eq!(scheduler.render_count(), 4);

	let children = children.borrow();
	assert_eq!(children.len(), 4);
	assert!(children.iter().all(|id| *id == children[0]));
	assert!(scheduler.is_active(children[0]));
}

struct Labeled {
	name: String,
	seen: Rc<RefCell<BTreeMap<String, Vec<InstanceId>>>>,
}
impl Component<MemorySurface> for Labeled {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let name = self.name.clone();
		let original = ui.state_with(|| name);
		self.seen.borrow_mut().entry(self.name.clone()).or_default().push(ui.id());
		ui.li(|li| li.text(format!("{}:{}", self.name, original.get())))
	}
}

struct Roster {
	keyed: bool,
	order: Handle<Vec<String>>,
	seen: Rc<RefCell<BTreeMap<String, Vec<InstanceId>>>>,
}
impl Component<MemorySurface> for Roster {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let order = ui.state(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
		*self.order.borrow_mut() = Some(order.clone());
		let keyed = self.keyed;
		let seen = &self.seen;
		ui.ul(|ul| {
			for name in order.get() {
				let item = Labeled {
					name: name.clone(),
					seen: Rc::clone(seen),
				};
				if keyed {
					ul.keyed(name, item);
				} else {
					ul.child(item);
				}
			}
		})
	}
}

fn roster(keyed: bool) -> (MemorySurface, MemoryNode, Scheduler<MemorySurface>, Rc<Recorder>, State<Vec<String>>, Rc<RefCell<BTreeMap<String, Vec<InstanceId>>>>) {
	let order: Handle<Vec<String>> = Handle::default();
	let seen = Rc::new(RefCell::new(BTreeMap::new()));
	let (surface, container, scheduler, recorder) = recorded(Roster {
		keyed,
		order: Rc::clone(&order),
		seen: Rc::clone(&seen),
	});
	(surface, container, scheduler, recorder, grab(&order), seen)
}

fn names(names: &[&str]) -> Vec<String> {
	names.iter().map(|name| (*name).to_owned()).collect()
}

#[test]
fn keyed_children_follow_their_key() {
	init_log();
	let (surface, container, _scheduler, recorder, order, seen) = roster(true);
	assert_eq!(surface.text_content(container), "a:ab:bc:c");
	recorder.lifecycle();

	order.set(names(&["c", "a", "b"]));
	assert_eq!(surface.text_content(container), "c:ca:ab:b");
	order.set(names(&["b", "c", "a"]));
	assert_eq!(surface.text_content(container), "b:bc:ca:a");

	for (name, ids) in &*seen.borrow() {
		assert_eq!(ids.len(), 3, "{}", name);
		assert!(ids.iter().all(|id| *id == ids[0]), "{} changed identity: {:?}", name, ids);
	}
	assert!(recorder.lifecycle().is_empty());
}

#[test]
fn unkeyed_children_follow_their_position() {
	init_log();
	let (surface, container, _scheduler, recorder, order, seen) = roster(false);
	recorder.lifecycle();

	order.set(names(&["c", "a", "b"]));
	assert_eq!(surface.text_content(container), "c:aa:bb:c");

	let seen = seen.borrow();
	assert_ne!(seen["c"][0], seen["c"][1]);
	assert_eq!(seen["a"][0], seen["c"][1]);
	assert!(recorder.lifecycle().is_empty());
}

#[test]
fn dropped_keys_are_unmounted_and_fresh_keys_start_over() {
	init_log();
	let (surface, container, scheduler, recorder, order, seen) = roster(true);
	let b = seen.borrow()["b"][0];
	recorder.lifecycle();

	order.set(names(&["a", "c"]));
	assert_eq!(recorder.lifecycle(), vec![Event::Unmounted(b)]);
	assert!(!scheduler.is_active(b));
	assert_eq!(scheduler.active_count(), 3);

	order.set(names(&["a", "b", "c"]));
	let fresh = *seen.borrow()["b"].last().unwrap();
	assert_ne!(fresh, b);
	assert!(matches!(recorder.lifecycle().as_slice(), [Event::Mounted(id, _)] if *id == fresh));
	assert_eq!(surface.text_content(container), "a:ab:bc:c");
}

type Cells = Rc<RefCell<BTreeMap<&'static str, State<u32>>>>;

struct Tally {
	name: &'static str,
	cells: Cells,
}
impl Component<MemorySurface> for Tally {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let count = ui.state(0_u32);
		self.cells.borrow_mut().insert(self.name, count.clone());
		ui.li(|li| li.text(format!("{}={}", self.name, count.get())))
	}
}

struct Board {
	order: Handle<Vec<&'static str>>,
	cells: Cells,
}
impl Component<MemorySurface> for Board {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let order = ui.state(vec!["a", "b", "c"]);
		*self.order.borrow_mut() = Some(order.clone());
		let cells = &self.cells;
		ui.ul(|ul| {
			for name in order.get() {
				ul.keyed(
					name,
					Tally {
						name,
						cells: Rc::clone(cells),
					},
				);
			}
		})
	}
}

#[test]
fn keyed_state_survives_reordering() {
	init_log();
	let order: Handle<Vec<&'static str>> = Handle::default();
	let cells = Cells::default();
	let (surface, container, scheduler, recorder) = recorded(Board {
		order: Rc::clone(&order),
		cells: Rc::clone(&cells),
	});
	let order = grab(&order);
	let b = cells.borrow()["b"].clone();
	recorder.lifecycle();

	b.set(5);
	order.set(vec!["c", "b", "a"]);
	order.set(vec!["b", "a", "c"]);
	assert_eq!(surface.inner_html(container), "<ul><li>b=5</li><li>a=0</li><li>c=0</li></ul>");
	assert!(recorder.lifecycle().is_empty());

	order.set(vec!["a", "c"]);
	for _ in 0..3 {
		scheduler.request_render();
	}
	assert_eq!(surface.inner_html(container), "<ul><li>a=0</li><li>c=0</li></ul>");
	let unmounted = recorder.lifecycle();
	assert_eq!(unmounted.len(), 1, "{:?}", unmounted);
	assert!(matches!(unmounted[0], Event::Unmounted(_)));
}

struct Lifecycle {
	label: &'static str,
	log: Rc<RefCell<Vec<String>>>,
}
impl Component<MemorySurface> for Lifecycle {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		self.log.borrow_mut().push(format!("render {}", self.label));
		ui.text(self.label)
	}

	fn updated(&mut self) {
		self.log.borrow_mut().push(format!("updated {}", self.label))
	}

	fn mounted(&mut self) {
		self.log.borrow_mut().push(format!("mounted {}", self.label))
	}

	fn unmounted(&mut self) {
		self.log.borrow_mut().push(format!("unmounted {}", self.label))
	}

	fn name(&self) -> &'static str {
		"Lifecycle"
	}
}

struct Other;
impl Component<MemorySurface> for Other {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		ui.text("other")
	}
}

struct Toggle {
	show: Handle<u8>,
	log: Rc<RefCell<Vec<String>>>,
}
impl Component<MemorySurface> for Toggle {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let show = ui.state(1_u8);
		*self.show.borrow_mut() = Some(show.clone());
		match show.get() {
			0 => (),
			1 => {
				ui.child(Lifecycle {
					label: "first",
					log: Rc::clone(&self.log),
				});
			}
			_ => {
				ui.child(Other);
			}
		}
	}
}

#[test]
fn lifecycle_hooks_run_once_each() {
	init_log();
	let show: Handle<u8> = Handle::default();
	let log = Rc::new(RefCell::new(Vec::new()));
	let (surface, container, scheduler, recorder) = recorded(Toggle {
		show: Rc::clone(&show),
		log: Rc::clone(&log),
	});
	let show = grab(&show);
	assert_eq!(*log.borrow(), vec!["render first", "mounted first"]);
	let mounted = recorder.lifecycle();
	assert_eq!(mounted.len(), 2);
	let child = match &mounted[1] {
		Event::Mounted(id, name) => {
			assert_eq!(name, "Lifecycle");
			*id
		}
		other => panic!("Unexpected event {:?}", other),
	};

	scheduler.request_render();
	assert_eq!(log.borrow()[2..], ["updated first", "render first"]);
	assert!(recorder.lifecycle().is_empty());

	show.set(0);
	assert_eq!(log.borrow().last().map(String::as_str), Some("unmounted first"));
	assert_eq!(recorder.lifecycle(), vec![Event::Unmounted(child)]);
	assert_eq!(surface.inner_html(container), "");

	show.set(1);
	let remounted = recorder.lifecycle();
	assert!(matches!(remounted.as_slice(), [Event::Mounted(id, _)] if *id != child));

	show.set(2);
	assert_eq!(surface.inner_html(container), "other");
	let swapped = recorder.lifecycle();
	assert_eq!(swapped.len(), 2, "{:?}", swapped);
	assert!(matches!(swapped[0], Event::Unmounted(_)));
	assert!(matches!(&swapped[1], Event::Mounted(_, name) if name.ends_with("Other")));

	let unmounts_before = log.borrow().iter().filter(|entry| entry.starts_with("unmounted")).count();
	scheduler.unmount();
	assert!(!scheduler.is_mounted());
	assert_eq!(scheduler.active_count(), 0);
	assert_eq!(log.borrow().iter().filter(|entry| entry.starts_with("unmounted")).count(), unmounts_before);
	assert_eq!(recorder.lifecycle().len(), 2);
	assert_eq!(surface.inner_html(container), "");
}

struct Unrenderable;
impl Component<MemorySurface> for Unrenderable {
	fn render(&mut self, _: &mut Ui<'_, MemorySurface>) {
		panic!("Rendered although mounting failed.")
	}
}

#[test]
fn missing_target_fails_before_rendering() {
	init_log();
	let surface = MemorySurface::new();
	let scheduler = Scheduler::new(surface.clone());
	assert!(matches!(scheduler.mount(None, Unrenderable), Err(MountError::MissingTarget)));
	assert!(!scheduler.is_mounted());
	assert_eq!(scheduler.render_count(), 0);
	assert!(surface.journal().is_empty());

	scheduler.request_render();
	assert_eq!(scheduler.render_count(), 0);
}

struct Settling {
	value: Handle<u32>,
	renders: Rc<Cell<usize>>,
	was_rendering: Rc<Cell<bool>>,
}
impl Component<MemorySurface> for Settling {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		self.renders.set(self.renders.get() + 1);
		if let Some(scheduler) = ui.scheduler().upgrade() {
			self.was_rendering.set(scheduler.is_rendering());
		}
		let value = ui.state(0_u32);
		*self.value.borrow_mut() = Some(value.clone());
		let current = value.get();
		if current == 1 {
			value.set(2);
		}
		ui.text(current.to_string())
	}
}

#[test]
fn state_set_during_render_runs_one_more_pass() {
	init_log();
	let value: Handle<u32> = Handle::default();
	let renders = Rc::new(Cell::new(0));
	let was_rendering = Rc::new(Cell::new(false));
	let (surface, container, scheduler, _recorder) = recorded(Settling {
		value: Rc::clone(&value),
		renders: Rc::clone(&renders),
		was_rendering: Rc::clone(&was_rendering),
	});
	assert!(was_rendering.get());

	grab(&value).set(1);
	assert_eq!(renders.get(), 3);
	assert_eq!(scheduler.render_count(), 3);
	assert_eq!(surface.text_content(container), "2");
	assert!(!scheduler.is_rendering());
}

#[derive(Debug)]
enum Cart {
	Add(u32),
	Clear,
}

impl Action for Cart {
	type Tag = &'static str;

	fn tag(&self) -> Self::Tag {
		match self {
			Cart::Add(_) => "add",
			Cart::Clear => "clear",
		}
	}
}

fn cart() -> Store<u32, Cart> {
	Store::builder(0)
		.on("add", |store, action| {
			if let Cart::Add(amount) = action {
				store.commit(|total| total + amount);
			}
		})
		.on("clear", |store, _| {
			store.commit(|_| 0);
		})
		.build()
}

struct Total {
	store: Store<u32, Cart>,
}
impl Component<MemorySurface> for Total {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let total = ui.use_store(&self.store);
		let store = self.store.clone();
		ui.button(|button| {
			button.on("click", move |_| {
				store.dispatch(Cart::Add(1));
			});
			button.text(format!("total {}", total));
		})
	}
}

struct Shop {
	open: Handle<bool>,
	store: Store<u32, Cart>,
}
impl Component<MemorySurface> for Shop {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		let open = ui.state(true);
		*self.open.borrow_mut() = Some(open.clone());
		if open.get() {
			ui.child(Total { store: self.store.clone() });
		}
	}
}

#[test]
fn store_subscription_follows_the_instance() {
	init_log();
	let store = cart();
	let open: Handle<bool> = Handle::default();
	let (surface, container, scheduler, recorder) = recorded(Shop {
		open: Rc::clone(&open),
		store: store.clone(),
	});
	assert_eq!(store.cell().observer_count(), 1);
	recorder.take();

	let button = surface.find_by_tag(container, "button")[0];
	surface.dispatch(button, "click");
	assert!(store.dispatch(Cart::Add(5)));
	assert_eq!(surface.text_content(container), "total 6");
	assert_eq!(store.cell().observer_count(), 1);
	assert_eq!(scheduler.render_count(), 3);
	assert!(recorder
		.take()
		.iter()
		.all(|event| matches!(event, Event::StateChanged(_, 0, name, _) if name == "store")));

	grab(&open).set(false);
	assert_eq!(store.cell().observer_count(), 0);
	assert!(store.dispatch(Cart::Clear));
	assert_eq!(scheduler.render_count(), 4);
	assert_eq!(surface.inner_html(container), "");
}

#[test]
fn inspector_sees_named_state_changes() {
	init_log();
	let (surface, container, _scheduler, recorder) = recorded(Clicks);
	let root = match recorder.take().as_slice() {
		[Event::Mounted(id, _)] => *id,
		other => panic!("Unexpected events {:?}", other),
	};

	let button = surface.find_by_tag(container, "button")[0];
	surface.dispatch(button, "click");
	assert_eq!(recorder.take(), vec![Event::StateChanged(root, 0, "clicks".to_owned(), "1".to_owned())]);
}

struct Greeting(&'static str);
impl Component<MemorySurface> for Greeting {
	fn render(&mut self, ui: &mut Ui<'_, MemorySurface>) {
		ui.p(|p| p.text(self.0))
	}
}

#[test]
fn replacing_the_root_clears_the_container() {
	init_log();
	let surface = MemorySurface::new();
	let container = surface.create_root();
	let scheduler = Scheduler::new(surface.clone());
	assert!(!scheduler.replace_root(Greeting("nobody"), None));
	assert_eq!(scheduler.render_count(), 0);

	scheduler.mount(Some(container), Greeting("hello")).unwrap();
	assert!(scheduler.replace_root(Greeting("goodbye"), None));
	assert_eq!(surface.inner_html(container), "<p>goodbye</p>");
	assert_eq!(scheduler.active_count(), 1);

	let other = surface.create_root();
	scheduler.mount(Some(other), Greeting("elsewhere")).unwrap();
	assert_eq!(surface.inner_html(container), "");
	assert_eq!(surface.inner_html(other), "<p>elsewhere</p>");
	scheduler.with_committed(|nodes| assert_eq!(nodes.len(), 1));
}
