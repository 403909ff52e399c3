pub use groupmind_core::error::{GroupmindError, Result};
