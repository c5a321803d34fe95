use clap::Parser;

use colograph::cli;

fn main() {
    let args = cli::Args::parse();

    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .format_timestamp_millis()
        .init();

    if let Err(err) = cli::run(args) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
