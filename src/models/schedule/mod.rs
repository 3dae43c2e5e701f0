//! The multi-period, multi-machine production scheduling model.

pub mod model;
pub mod objectives;
pub mod results;
pub mod sets_and_parameters;

pub use model::{ScheduleMilp, Variables};
pub use results::{ObjectiveValue, ScheduleResult};
pub use sets_and_parameters::{Parameters, Sets};
