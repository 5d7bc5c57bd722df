pub mod lending;
pub mod scenario;
