pub mod fetch;
pub mod generator;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod render;
pub mod text_fit;
