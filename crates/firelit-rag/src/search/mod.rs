pub mod retriever;

pub use retriever::{Retriever, DEFAULT_K};
