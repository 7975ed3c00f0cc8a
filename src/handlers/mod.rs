//! HTTP handlers. Entity handlers are generic over the model; routes pick the type.

pub mod entity;
pub mod users;
pub use entity::*;
pub use users::create_user;
