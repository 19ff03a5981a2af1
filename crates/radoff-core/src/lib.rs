pub mod cancel;
pub mod dataset;
pub mod errors;
pub mod evaluator;
pub mod scheduler;
pub mod solver;
