//! Persistence contracts implemented by `ledger_sentinel_storage`.

mod traits;

pub use traits::*;
