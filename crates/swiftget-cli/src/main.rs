use swiftget_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logging() {
        eprintln!("swiftget: log file unavailable ({}), using stderr", e);
        logging::init_logging_stderr();
    }

    if let Err(err) = Cli::run_from_args().await {
        eprintln!("swiftget error: {:#}", err);
        std::process::exit(1);
    }
}
