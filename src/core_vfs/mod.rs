pub mod resolver;

pub use resolver::{resolve, stays_inside, to_real};
