//! Repository traits.

pub mod sessions;

pub use sessions::SessionRepo;
