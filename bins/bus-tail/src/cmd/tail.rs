use std::time::Duration;

use gw_event_bus::message::PaymentsHighValueTransferMessage;
use gw_event_bus::{Consumer, Message, Topic};

use crate::config::TailArgs;
use crate::error::TailError;

/// Register a logging handler on `topic`.
async fn tail<M: Message + std::fmt::Debug>(topic: &Topic<M>, verbose: bool) -> Result<(), TailError> {
    let name = topic.name();
    topic
        .handle(move |msg: M| async move {
            if verbose {
                let body = serde_json::to_string(&msg).unwrap_or_else(|e| format!("<{e}>"));
                tracing::info!(topic = name, %body, "message");
            } else {
                tracing::info!(topic = name, message = ?msg, "message");
            }
        })
        .await?;
    tracing::info!(topic = name, partition = topic.partition(), "tailing");
    Ok(())
}

pub async fn run(args: TailArgs) -> Result<(), TailError> {
    tracing::info!("bus-tail starting");
    let config = args.config.load()?;

    // Ping is a blocking librdkafka call.
    let consumer = tokio::task::spawn_blocking(move || Consumer::new(&config)).await??;
    let topics = &consumer.topics;

    tail::<PaymentsHighValueTransferMessage>(&topics.payments_high_value_transfer, args.verbose).await?;

    tracing::info!("ready");

    // --- Wait for Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    let timeout = Duration::from_secs(args.shutdown_timeout_secs);
    match tokio::time::timeout(timeout, topics.close_all()).await {
        Ok(result) => result?,
        Err(_) => return Err(TailError::ShutdownTimeout(args.shutdown_timeout_secs)),
    }

    tracing::info!("shutdown complete");
    Ok(())
}
