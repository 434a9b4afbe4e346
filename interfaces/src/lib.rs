pub mod defs;

pub use defs::ItemRecord;
