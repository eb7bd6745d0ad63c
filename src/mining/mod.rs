pub mod controller;
pub mod functions;
pub mod queue;
