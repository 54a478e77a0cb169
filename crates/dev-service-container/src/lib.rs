pub mod check;
pub mod compose;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod instances;
pub mod lsof;
pub mod process;
pub mod procfs;

pub use check::*;
pub use compose::*;
pub use engine::*;
pub use error::*;
pub use inspector::*;
pub use instances::*;
pub use lsof::LsofInspector;
pub use procfs::ProcNetInspector;
