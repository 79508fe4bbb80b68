use anyhow::Result;
use clap::Parser;
use pledge::{
    error::{raise, throw, Exception, HostError, UnifiedError},
    task::Executor,
    wrapped::WrappedFuture,
};

#[derive(Debug, Clone)]
enum Parse {
    Empty,
    NotANumber(String),
}

impl Exception for Parse {
    fn tag(&self) -> &'static str {
        match self {
            Parse::Empty => "Empty",
            Parse::NotANumber(_) => "NotANumber",
        }
    }
}

/// Parse and halve a number, recovering from whatever goes wrong.
#[derive(Parser, Debug)]
struct Args {
    /// The number to halve.
    #[arg(default_value = "")]
    input: String,

    /// Fail with a host error when the number is odd.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let Args { input, strict } = Args::parse();

    let halved = WrappedFuture::resolve(input)
        .map(|s| -> i64 {
            let s = s.trim();

            if s.is_empty() {
                raise(Parse::Empty);
            }

            s.parse()
                .unwrap_or_else(|_| raise(Parse::NotANumber(s.to_owned())))
        })
        .then(move |n| {
            if strict && n % 2 != 0 {
                throw(HostError::new(format!("{n} is odd")));
            }

            WrappedFuture::resolve(n / 2)
        })
        .catch(|e| {
            match &e {
                UnifiedError::DomainFailure(exn) => match exn.downcast_ref::<Parse>() {
                    Some(Parse::NotANumber(s)) => println!("not a number: {s:?}"),
                    _ => println!("bad input ({})", exn.tag()),
                },
                UnifiedError::HostFailure(err) => println!("refused: {}", err.message()),
                UnifiedError::UnknownFailure(_) => println!("{e}"),
            }
            0
        })
        .finally(|| println!("done"));

    let n = Executor::block_on(async move { halved.await })?;
    println!("{n}");

    Ok(())
}
