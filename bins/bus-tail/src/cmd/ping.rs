use crate::config::ConfigArgs;
use crate::error::TailError;

pub async fn run(args: ConfigArgs) -> Result<(), TailError> {
    let config = args.load()?;

    // librdkafka metadata calls block.
    let brokers = tokio::task::spawn_blocking(move || gw_event_bus::ping(&config)).await??;

    for broker in &brokers {
        println!("{broker}");
    }
    tracing::info!(brokers = brokers.len(), "broker reachable");
    Ok(())
}
