//! MQTT publish/subscribe test harness
//!
//! ```text
//! gapi-cmdline sub <broker> <topic>
//! gapi-cmdline pub <broker> <topic> <message>
//! ```

use gapi_mqtt::cli::{CliError, Invocation, Mode};
use gapi_mqtt::config::HarnessConfig;
use gapi_mqtt::console::ConsoleHandler;
use gapi_mqtt::harness::{Action, Session};
use gapi_mqtt::observability::init_default_logging;
use gapi_mqtt::HarnessError;
use std::process;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let invocation = match Invocation::try_from_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => report_cli_error(err),
    };

    init_default_logging(invocation.connection.verbose);

    info!(
        "Starting gapi-cmdline v{} ({:?} on {})",
        env!("CARGO_PKG_VERSION"),
        invocation.mode,
        invocation.broker
    );

    let config = match HarnessConfig::load(invocation.connection.config.as_deref())
        .and_then(|config| config.with_overrides(&invocation.connection.overrides()))
    {
        Ok(config) => config,
        Err(e) => exit_with(HarnessError::from(e)),
    };

    let action = match invocation.mode {
        Mode::Subscribe => Action::Subscribe {
            topic: invocation.topic,
        },
        Mode::Publish => Action::Publish {
            topic: invocation.topic,
            message: invocation.message,
        },
    };

    let session = Session::new(invocation.broker, action, config, Arc::new(ConsoleHandler));

    match session.run().await {
        Ok(reason) => info!("Shutdown complete: {:?}", reason),
        Err(e) => exit_with(e),
    }
}

fn report_cli_error(err: CliError) -> ! {
    let code = err.exit_code();
    match err {
        CliError::Display(err) => err.exit(),
        CliError::Usage { usage, detail } => {
            if let Some(detail) = detail {
                eprint!("{detail}");
            }
            eprint!("{usage}");
        }
        CliError::UnknownMode(mode) => {
            eprintln!("{}", HarnessError::UnknownMode(mode));
        }
    }
    process::exit(code);
}

fn exit_with(err: HarnessError) -> ! {
    debug!("Run failed: {:?}", err);
    match &err {
        HarnessError::ConnectFailed { .. }
        | HarnessError::ConnectRefused { .. }
        | HarnessError::Config(_)
        | HarnessError::Signals(_) => eprintln!("Error: {err}"),
        _ => eprintln!("{err}"),
    }
    process::exit(err.exit_code());
}
