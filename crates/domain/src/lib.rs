pub mod entities;
pub mod events;
pub mod ports;
pub mod repositories;
pub mod sqlx_impls;
pub mod value_objects;

pub use dispatch_core::{DispatchError, DispatchResult, ErrorKind};
pub use entities::*;
pub use events::*;
pub use ports::*;
pub use repositories::*;
pub use value_objects::*;
