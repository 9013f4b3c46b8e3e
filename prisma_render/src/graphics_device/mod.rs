/// Graphics device module - backend-facing traits, handles and descriptors

// Module declarations
pub mod handles;
pub mod types;
pub mod command_list;
pub mod device;

// Recording mock device (public so integration tests and downstream crates can use it)
pub mod mock;

// Re-export everything
pub use handles::*;
pub use types::*;
pub use command_list::*;
pub use device::*;
