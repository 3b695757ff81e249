pub mod pose;
pub mod sampling;
