//! `ackwire-client <WS|WSS> <host> <port>`: sends one message per stdin
//! line.
//!
//! `ping` sends a ping frame, `deconnection` disconnects, and anything else
//! is sent as a text message.

use std::process::ExitCode;
use std::time::Duration;

use ackwire::args::{self, ClientArgs};
use ackwire::{logging, AckwireError};
use tokio::io::BufReader;

/// Stdin is read on a blocking thread that cannot be interrupted; don't
/// wait for it on the way out.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> ExitCode {
    logging::init(logging::DEFAULT_DIRECTIVE);

    let args: ClientArgs = match args::parse(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ AckwireError::Argument(_)) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "client failed");
            ExitCode::FAILURE
        }
    };
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn run(args: ClientArgs) -> Result<(), AckwireError> {
    let client = args.into_builder()?.connect().await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let end = client.session().run(stdin).await?;
    tracing::info!(?end, "session ended");
    client.finish().await
}
