//! Broker connectivity check: connect, then disconnect
//!
//! Usage: gapi-connection <broker>

use gapi_mqtt::cli::{CliError, ConnectionInvocation};
use gapi_mqtt::config::HarnessConfig;
use gapi_mqtt::console::ConsoleHandler;
use gapi_mqtt::harness::{Action, Session};
use gapi_mqtt::observability::init_default_logging;
use gapi_mqtt::HarnessError;
use std::process;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    let invocation = match ConnectionInvocation::try_from_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(CliError::Display(err)) => err.exit(),
        Err(CliError::Usage { usage, detail }) => {
            if let Some(detail) = detail {
                eprint!("{detail}");
            }
            eprint!("{usage}");
            process::exit(1);
        }
        Err(CliError::UnknownMode(_)) => process::exit(1),
    };

    init_default_logging(invocation.connection.verbose);

    let result = match HarnessConfig::load(invocation.connection.config.as_deref())
        .and_then(|config| config.with_overrides(&invocation.connection.overrides()))
    {
        Ok(config) => {
            Session::new(
                invocation.broker,
                Action::CheckConnection,
                config,
                Arc::new(ConsoleHandler),
            )
            .run()
            .await
        }
        Err(e) => Err(HarnessError::from(e)),
    };

    match result {
        Ok(reason) => info!("Connection check finished: {:?}", reason),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    }
}
