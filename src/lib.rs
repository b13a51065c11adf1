#![doc(html_root_url = "https://docs.rs/state-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Keeps a DOM subtree in sync with a remotely owned state tree.
//!
//! The [`Engine`] owns the [state tree](tree::StateTree), the [reactive core](reactive), the [constant pool](constant_pool::ConstantPool)
//! and a [`Dom`] backend. Binding a state node creates (or adopts) its DOM node and keeps it up to date,
//! while selected local changes and native events are reported through [`Upstream`].
//!
//! See the README for a complete example.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod binder;
pub mod constant_pool;
pub mod dom;
mod element;
pub mod engine;
pub mod error;
pub mod expression;
pub mod memory;
pub mod reactive;
pub mod tree;
pub mod value;
pub mod web;

pub use binder::BindingStrategy;
pub use dom::{Dom, DomNodeId, EventData};
pub use engine::{Config, DomListenerId, Engine, Upstream};
pub use error::{Error, Result};
pub use reactive::{ComputationId, Tracker};
pub use tree::{feature, FeatureId, ListenerTarget, PropertyId, StateNodeId, TreeEvent, TreeListenerId};
pub use value::Value;
