//! Small shared helpers.

pub mod count;
pub mod path;
