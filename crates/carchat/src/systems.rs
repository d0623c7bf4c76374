mod system;
pub mod car;

pub use system::System;
