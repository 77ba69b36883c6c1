pub mod batch;
pub mod scanner;

pub use batch::{BatchFetcher, BatchStats};
pub use scanner::TokenRangeScanner;
