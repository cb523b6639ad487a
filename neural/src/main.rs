use std::sync::Arc;

use args::{Args, Discipline};
use clap::Parser;
use config::LimiterConfig;
use limiter::{Acquire, DistributedLimiter, Storage};

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = args.config()?;

    let limiters = args.limiters(&config)?;

    let storage = match Storage::new(&config.storage).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            log::error!("Failed to set up limiter storage: {e}");
            std::process::exit(1);
        }
    };

    for limiter in limiters {
        probe(&args, storage.clone(), limiter.clone()).await?;
    }

    Ok(())
}

/// Attempts the selected acquisitions against one limiter and logs every outcome.
async fn probe(args: &Args, storage: Arc<Storage>, config: LimiterConfig) -> anyhow::Result<()> {
    let identity = config.identity.clone();
    let limiter = DistributedLimiter::new(storage, config)?;

    for &discipline in args.disciplines() {
        let mut granted = 0;

        for attempt in 1..=args.attempts {
            let result = match discipline {
                Discipline::Concurrent => limiter.try_acquire_concurrent().await,
                Discipline::Rate => limiter.try_acquire_rate().await,
                Discipline::Request => limiter.try_acquire_request().await,
            };

            log::debug!("Limiter '{identity}' {discipline} attempt {attempt}: {result}");

            if result == Acquire::Success {
                granted += 1;
            }
        }

        log::info!(
            "Limiter '{identity}' {discipline}: {granted} of {} attempts granted",
            args.attempts
        );

        if discipline == Discipline::Concurrent && args.release {
            for _ in 0..granted {
                limiter.release_concurrent().await;
            }

            log::info!("Limiter '{identity}' released {granted} concurrency slots");
        }
    }

    Ok(())
}
