//! Router-level middleware
//!
//! Applied uniformly to every registered route, independent of the
//! per-route wrappers in [`crate::instrument`].

pub mod template_counter;

pub use template_counter::{PATH_LABEL, REQUEST_COUNTER, TemplateCounters, count_by_template};
