mod engine;
mod explain;
pub mod numeric;
mod types;

pub use engine::{calculate, calculate_with_locale};
pub use types::{Allocation, Inputs, Locale, SplitMode};
