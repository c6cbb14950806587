use clap::Parser;
use meter_listener::app::{self, Options, RealScanner, RunError};
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Run the scan loop against the real BlueZ backend, writing readings to
/// stdout and stopping on Ctrl-C in daemon mode.
///
/// # Errors
/// Returns `RunError` if Bluetooth initialization, serialization, or writing
/// to stdout fails. Timeout and interruption are normal termination.
async fn run(options: Options) -> Result<(), RunError> {
    let scanner = RealScanner;
    let mut stdout = std::io::stdout();
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    app::run_with_io(options, &scanner, &mut stdout, shutdown).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    env_logger::init();

    let options = Options::parse();

    match run(options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
