pub mod health;
pub mod image_access;
pub mod image_transform;
pub mod images;
