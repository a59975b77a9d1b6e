pub mod lines;
pub mod numbers;
