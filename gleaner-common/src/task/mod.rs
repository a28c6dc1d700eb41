mod info;
mod tuple;

pub use info::{HarvestTask, TaskReport, TaskState};
pub use tuple::{Revision, TaskTuple};
