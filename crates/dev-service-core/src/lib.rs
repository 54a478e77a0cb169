pub mod compose;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod service;
pub mod template;
pub mod volumes;

pub use compose::*;
pub use error::*;
pub use installer::*;
pub use manifest::*;
pub use service::*;
pub use template::{Substitutions, TemplateStore, VolumeSection};
pub use volumes::*;
