// src/main.rs

use assetpipe::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("assetpipe error: {err:?}");
        std::process::exit(4);
    }

    if let Err(err) = run(args).await {
        eprintln!("assetpipe error: {err}");
        std::process::exit(err.exit_code());
    }
}
