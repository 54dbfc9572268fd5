pub mod compression;
pub mod grounding;
pub mod screenshot;
pub mod types;
