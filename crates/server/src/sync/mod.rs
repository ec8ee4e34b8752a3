pub mod lifecycle;
pub mod projector;
pub mod scheduler;
pub mod sweeper;
pub mod webhook;
