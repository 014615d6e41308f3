use aqara_gateway_tools::commands;
use clap::Parser as _;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Modes(commands::modes::Args),
    Decode(commands::decode::Args),
    Control(commands::control::Args),
    Replay(commands::replay::Args),
    Alarm(commands::alarm::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

#[derive(thiserror::Error, Debug)]
#[error("could not parse the AQARA_GATEWAY_TOOLS_LOG filter")]
struct LogFilterError(#[source] tracing_subscriber::filter::ParseError);

fn main() {
    let filter_description =
        std::env::var("AQARA_GATEWAY_TOOLS_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = match filter_description.parse::<tracing_subscriber::filter::targets::Targets>() {
        Ok(filter) => filter,
        Err(e) => return end(Err(LogFilterError(e))),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Modes(args) => end(commands::modes::run(args)),
        Commands::Decode(args) => end(commands::decode::run(args)),
        Commands::Control(args) => end(commands::control::run(args)),
        Commands::Replay(args) => end(commands::replay::run(args)),
        Commands::Alarm(args) => end(commands::alarm::run(args)),
    }
}
