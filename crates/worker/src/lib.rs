//! Shared task runtime primitives for sluice.
//!
//! Every long-lived loop and short-lived helper task in the workspace is spawned
//! through [`spawn`] so it carries a [`TaskClass`] in traces, and loops that must be
//! torn down deterministically are wrapped in a [`TaskJoin`].

mod class;
mod join;
mod spawn;

pub use class::TaskClass;
pub use join::TaskJoin;
pub use spawn::spawn;
