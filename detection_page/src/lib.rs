mod container;
mod page;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod controller;
pub mod detection;
pub mod image_loader;
pub mod inference_client;
pub mod renderer;

#[cfg(test)]
mod testing;

pub use app::start_app;
pub use container::ImageContainer;
