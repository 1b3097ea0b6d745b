pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod networks;
pub mod normalize;
pub mod pipeline;
pub mod upstream;
