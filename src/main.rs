use std::process::ExitCode;

use matchcast::{AppConfig, Server};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("matchcast: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match Server::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // the log queue may already be gone
            eprintln!("matchcast: {}", e);
            ExitCode::FAILURE
        }
    }
}
