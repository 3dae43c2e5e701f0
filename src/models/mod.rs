pub mod milp;
pub mod schedule;
pub mod utils;

pub use milp::Model;
pub use schedule::ScheduleMilp;
