pub mod load_balancer;
pub mod storage_node;

pub use load_balancer::{DEFAULT_REQUEST_TIMEOUT, LoadBalancer, PutStatus};
pub use storage_node::{GetOutcome, PutOutcome, StorageNode};
