pub mod classifier;
pub mod engine;
pub mod extract;
pub mod history;
pub mod intent;
pub mod planner;
pub mod prompts;
pub mod state;
