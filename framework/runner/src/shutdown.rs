use tokio::signal;
use fanout_core::prelude::ShutdownHandle;

pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, interrupts will not stop the workers cleanly: {e:?}");
            return;
        }
        println!("Received shutdown signal, terminating child processes...");
        listener_handle.shutdown();
    });

    handle
}
