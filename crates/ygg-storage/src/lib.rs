pub mod codec;
pub mod fjall;
pub mod keys;
pub mod mem;
pub mod reader;
pub mod traits;
pub mod types;

pub use self::fjall::FjallEngine;
pub use mem::MemEngine;
pub use reader::Reader;
pub use traits::RawEngine;
pub use types::{WriteBatch, WriteOp};

use ygg_types::{DATA_CF, RESERVED_CFS};

/// Every partition a node opens: the reserved bookkeeping partitions, the
/// default data partition and any extra data partitions from configuration.
pub fn node_partitions<S: AsRef<str>>(extra_data_cfs: &[S]) -> Vec<String> {
    let mut cfs: Vec<String> = RESERVED_CFS.iter().map(|s| s.to_string()).collect();
    cfs.push(DATA_CF.to_string());
    for cf in extra_data_cfs {
        let cf = cf.as_ref();
        if !cfs.iter().any(|c| c == cf) {
            cfs.push(cf.to_string());
        }
    }
    cfs
}
