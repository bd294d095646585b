//! Math types for scene transforms

mod quat;
mod transform;
mod vec3;

pub use quat::Quat;
pub use transform::Transform;
pub use vec3::Vec3;
