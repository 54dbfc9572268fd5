pub mod actions;
pub mod apps;
pub mod coordinator;
pub mod dispatcher;
pub mod input;
