pub mod pool;

pub use pool::{Mempool, MempoolConfig, MempoolStats};
