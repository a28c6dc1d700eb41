use gleaner_common::state::StateStore;

use crate::db::MemoryStateStore;

mod bucket;
mod identity;
mod records;
mod task;

impl StateStore for MemoryStateStore {}
