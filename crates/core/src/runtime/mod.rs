mod scheduler;
mod shutdown;

pub use scheduler::Runtime;
pub use shutdown::ShutdownGuard;
