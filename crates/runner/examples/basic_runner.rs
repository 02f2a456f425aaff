//! Basic example of using footprint-runner
//!
//! Demonstrates named concurrent processes, graceful shutdown on Ctrl+C,
//! and cleanup with closers.
//!
//! Run with: cargo run --example basic_runner

use footprint_runner::Runner;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Press Ctrl+C to trigger graceful shutdown");

    Runner::new()
        .with_named_process("counter", |ctx| async move {
            let mut counter = 0;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!(counter, "Counter stopping gracefully");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        counter += 1;
                        tracing::info!(counter, "Counting");
                    }
                }
            }
            Ok(())
        })
        .with_named_process("heartbeat", |ctx| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!("Heartbeat stopping gracefully");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {
                        tracing::info!("Still running");
                    }
                }
            }
            Ok(())
        })
        .with_closer("buffers", || async move {
            tracing::info!("Flushing buffers");
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(5))
        .run()
        .await
}
