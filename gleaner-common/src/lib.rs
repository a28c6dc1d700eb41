pub mod bucket;
pub mod error;
pub mod harvest;
pub mod notification;
pub mod param_keys;
pub mod retry;
pub mod source;
pub mod state;
pub mod task;
