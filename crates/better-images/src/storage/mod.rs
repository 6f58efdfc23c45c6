pub mod filesystem;
pub mod retention;

pub use filesystem::FileStorage;
pub use retention::{sweep, SweepReport};
