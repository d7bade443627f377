pub mod iteration;
pub mod xml;
