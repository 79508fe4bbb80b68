use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use pledge::{
    error::Failure,
    futures::timer::Timer,
    task::Executor,
    wrapped::{all, all_settled, WrappedFuture},
};

/// Join several timers and print their values in input order.
#[derive(Parser, Debug)]
struct Args {
    /// Delay of each timer, in milliseconds.
    #[arg(default_values_t = [300, 200, 100])]
    delays: Vec<u64>,

    /// Reject the timer at this position instead of fulfilling it.
    #[arg(short, long)]
    fail: Option<usize>,
}

fn timer(idx: usize, ms: u64, fail: bool) -> WrappedFuture<u64> {
    WrappedFuture::from_future(async move {
        Timer::sleep(Duration::from_millis(ms)).await.map_err(Failure::new)?;

        if fail {
            return Err(Failure::new(format!("timer {idx} gave up")));
        }

        Ok::<_, Failure>(ms)
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let timers: Vec<_> = args
        .delays
        .iter()
        .enumerate()
        .map(|(idx, ms)| timer(idx, *ms, args.fail == Some(idx)))
        .collect();

    let start = Instant::now();
    let joined = all(timers.clone());
    let settled = all_settled(timers);

    let outcomes = Executor::block_on(async move { settled.await })?;

    for (idx, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(ms) => println!("timer {idx}: fulfilled with {ms}"),
            Err(e) => println!("timer {idx}: {e}"),
        }
    }

    match Executor::block_on(async move { joined.await }) {
        Ok(values) => println!("all: {values:?} after {:?}", start.elapsed()),
        Err(e) => println!("all: rejected with {e}"),
    }

    Ok(())
}
