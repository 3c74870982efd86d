use bundleproxy::{cli::BundleIngressArgs, trace::init_tracing};
use clap::Parser;
use std::future::Future;
use tracing::info;

#[cfg(all(feature = "jemalloc", unix))]
type AllocatorInner = tikv_jemallocator::Jemalloc;
#[cfg(not(all(feature = "jemalloc", unix)))]
type AllocatorInner = std::alloc::System;

/// Custom allocator.
pub(crate) type Allocator = AllocatorInner;

/// Creates a new [custom allocator][Allocator].
pub(crate) const fn new_allocator() -> Allocator {
    AllocatorInner {}
}

#[global_allocator]
static ALLOC: Allocator = new_allocator();

fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let args = BundleIngressArgs::parse();
    init_tracing(args.log_json);

    // Configure the Tokio runtime.
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.io_threads)
        .enable_all()
        .build()
        .expect("failed to create runtime");
    info!("Main task started");

    tokio_runtime.block_on(run_until_ctrl_c(bundleproxy::run(args)))?;

    info!("Main task finished. Shutting down tokio runtime");

    Ok(())
}

/// Runs the future to completion or until:
/// - `ctrl-c` is received.
/// - `SIGTERM` is received (unix only).
async fn run_until_ctrl_c<F>(fut: F) -> eyre::Result<()>
where
    F: Future<Output = eyre::Result<()>>,
{
    let ctrl_c = tokio::signal::ctrl_c();

    let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let sigterm = stream.recv();
    let sigterm = Box::pin(sigterm);
    let ctrl_c = Box::pin(ctrl_c);
    let fut = Box::pin(fut);

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received ctrl-c");
        },
        _ = sigterm => {
            tracing::info!("Received SIGTERM");
        },
        res = fut => res?,
    }

    Ok(())
}
