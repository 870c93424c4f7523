mod options;
mod shutdown;

pub mod prelude {
    pub use crate::options::{InvalidOptionsError, RunOptions};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
