pub mod custom_type;
pub mod entities;

pub use custom_type::timestamp;
pub use entities::*;
