mod expiry;
mod jobs;
mod namespaces;
mod objects;
mod reap;

pub use self::expiry::*;
pub use self::jobs::*;
pub use self::namespaces::*;
pub use self::objects::*;
pub use self::reap::*;
