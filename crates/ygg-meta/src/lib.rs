pub mod manager;
pub mod region;
pub mod server;
pub mod store;

pub use manager::StoreMetaManager;
pub use region::StoreRegionMeta;
pub use server::StoreServerMeta;
pub use store::MetaStore;
