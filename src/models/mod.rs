pub mod alert;
pub mod execution;
pub mod template;
