pub mod actor;
pub mod middleware;
