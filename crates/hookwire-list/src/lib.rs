#![forbid(unsafe_code)]

//! Ordered artifact lists driven by a [`HookArray`](hookwire_core::HookArray).
//!
//! [`build_list`] subscribes to an array, builds one artifact per element
//! and keeps a [`ListHost`] in the same order as the array while it is
//! mutated. Elements the builder declines (or panics on) leave holes that
//! occupy an index but put nothing in the host.
//!
//! ```ignore
//! let todos = wrap_array(vec!["write", "test"]);
//! let view = build_list(&todos, |t| Some(t.to_uppercase()), VecHost::new());
//! todos.push("ship");
//! view.with_host(|h| assert_eq!(h.items(), ["WRITE", "TEST", "SHIP"]));
//! ```

pub mod host;
pub mod reconcile;

pub use host::{HostOp, ListHost, Node, VecHost};
pub use reconcile::{ListView, build_list};
