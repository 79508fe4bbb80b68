use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::info;
use pledge::{
    error::Failure,
    futures::timer::Timer,
    task::Executor,
    wrapped::{race, WrappedFuture},
};

/// Race a handful of timers against each other.
///
/// The fastest timer wins, but every entrant still runs to completion.
#[derive(Parser, Debug)]
struct Args {
    /// Delay of each entrant, in milliseconds.
    #[arg(default_values_t = [1000, 500, 100])]
    delays: Vec<u64>,
}

fn entrant(idx: usize, delay: Duration) -> WrappedFuture<usize> {
    WrappedFuture::from_future(async move {
        Timer::sleep(delay).await.map_err(Failure::new)?;
        info!("entrant {idx} finished after {delay:?}");
        Ok::<_, Failure>(idx)
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let start = Instant::now();

    let winner = race(
        args.delays
            .iter()
            .enumerate()
            .map(|(idx, ms)| entrant(idx, Duration::from_millis(*ms))),
    );

    let idx = Executor::block_on(async move { winner.await })?;

    println!(
        "Entrant {idx} won; all entrants done after {:?}",
        start.elapsed()
    );

    Ok(())
}
