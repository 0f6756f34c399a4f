pub mod clusters;
pub mod config;
pub mod enaho;
pub mod households;
pub mod imagery;
pub mod pipeline;
pub mod store;
pub mod train;
pub mod wealth;
