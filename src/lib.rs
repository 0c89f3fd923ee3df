//! A declarative UI engine.
//!
//! [`Component`]s describe their output imperatively through a [`Ui`] on every render.
//! A [`Scheduler`] matches each rendered component to a persistent instance (by call order or [`Key`]),
//! and a [`Reconciler`] patches the live [`Surface`] from the previously committed tree to the new one.
//!
//! The browser DOM is available as [`DomSurface`], and [`MemorySurface`] runs everything headless.

#![doc(html_root_url = "https://docs.rs/xylem/0.0.1")]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod component;
pub mod diff;
pub mod dom;
pub mod error;
pub mod inspect;
pub mod listener_cache;
pub mod memory;
pub mod node;
pub mod reactive;
pub mod router;
pub mod scheduler;
pub mod surface;

pub use builder::{ElementBuilder, Ui};
pub use component::{Component, InstanceId, Key, NavEntry};
pub use diff::Reconciler;
pub use dom::DomSurface;
pub use error::MountError;
pub use inspect::{Inspector, TracingInspector};
pub use memory::{MemoryEvent, MemoryNode, MemorySurface, Mutation};
pub use node::{Directive, Element, Listener, Node, Phase, Transition};
pub use reactive::{Action, State, Store, StoreBuilder, SubscriptionId, WeakState};
pub use router::{NotFound, Router, WeakRouter};
pub use scheduler::{Scheduler, WeakScheduler};
pub use surface::Surface;
