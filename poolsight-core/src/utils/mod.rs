pub mod nano;

pub use nano::Nano;
