//! # Operator Console
//!
//! Line editing console which sends telecommands to the teleoperation executable. Each line is
//! parsed as a TC, for example `arm request` or `trial start 12 --condition haptics`, sent as
//! JSON over the TC endpoint, and the response printed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::{clap, StructOpt};

// Internal
use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    tc::{Tc, TcResponse},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "ROV $ ";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "operator_console", about = "Send telecommands to the teleoperation executable")]
struct Opts {
    /// Endpoint of the executable's TC server
    #[structopt(long, default_value = "tcp://localhost:5020")]
    endpoint: String,

    /// File the command history is kept in
    #[structopt(long, default_value = "console_history.txt")]
    history: String,

    /// How long to wait for a response. Arming can take several seconds.
    ///
    /// Units: milliseconds
    #[structopt(long, default_value = "10000")]
    timeout_ms: i32,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What the operator typed.
#[derive(Debug)]
enum Line {
    Empty,
    Help,
    Exit,
    Tc(Tc),
    Error(clap::Error),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("operator_console", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    info!("Operator Console\n");

    // ---- INITIALISE NETWORK ----

    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        req_correlate: true,
        req_relaxed: true,
        recv_timeout: opts.timeout_ms,
        send_timeout: 100,
        ..SocketOptions::link()
    };

    let socket = MonitoredSocket::new(&ctx, zmq::REQ, socket_options, &opts.endpoint)
        .wrap_err("Failed to create the TC socket")?;

    info!("TC socket connecting to {}", opts.endpoint);

    // ---- MAIN LOOP ----

    let mut rl = DefaultEditor::new().wrap_err("Failed to create the line editor")?;
    if rl.load_history(&opts.history).is_err() {
        info!("No history found at {}", opts.history);
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!("Could not read the line: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            Line::Empty => continue,
            Line::Help => {
                Tc::clap().print_long_help().ok();
                println!();
            }
            Line::Exit => break,
            Line::Error(e) => println!("{}", e.message),
            Line::Tc(tc) => {
                rl.add_history_entry(line.as_str()).ok();

                if !socket.connected() {
                    warn!("Not connected to the executable, the TC will be sent once connected");
                }

                match send_tc(&socket, &tc) {
                    Ok(TcResponse::Ok) => println!("Ok"),
                    Ok(r) => println!("{:?}", r),
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    if let Err(e) = rl.save_history(&opts.history) {
        warn!("Could not save the history: {}", e);
    }

    info!("Exiting");
    session.exit();

    Ok(())
}

/// Interpret a line typed by the operator.
fn parse_line(line: &str) -> Line {
    let line = line.trim();

    match line {
        "" => Line::Empty,
        "help" | "?" => Line::Help,
        "exit" | "quit" => Line::Exit,
        _ => match Tc::from_iter_safe(std::iter::once("tc").chain(line.split_whitespace())) {
            Ok(tc) => Line::Tc(tc),
            Err(e) => Line::Error(e),
        },
    }
}

/// Send a TC and wait for the response.
fn send_tc(socket: &MonitoredSocket, tc: &Tc) -> Result<TcResponse, Report> {
    let json = tc.to_json().wrap_err("Could not serialize the TC")?;

    socket
        .send(json.as_str(), 0)
        .wrap_err("Could not send the TC")?;

    let msg = socket
        .recv_string(0)
        .wrap_err("No response from the executable")?
        .map_err(|_| color_eyre::eyre::eyre!("The response was not valid UTF-8"))?;

    serde_json::from_str(&msg).wrap_err("Could not parse the response")
}
