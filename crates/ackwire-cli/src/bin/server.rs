//! `ackwire-server <WS|WSS> <port>`: acknowledges every text message until
//! interrupted.

use std::process::ExitCode;

use ackwire::args::{self, ServerArgs};
use ackwire::{logging, AckwireError};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(logging::DEFAULT_DIRECTIVE);

    let args: ServerArgs = match args::parse(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ServerArgs) -> Result<(), AckwireError> {
    let server = args.into_builder()?.build().await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
