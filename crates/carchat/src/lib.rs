pub mod agent;
pub mod carquery;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod systems;
