use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esp3gate_frame::PacketType;
use esp3gate_link::{Connector, LinkError};
use tracing::info;

use crate::cmd::MonitorArgs;
use crate::exit::{link_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let connector = Connector::new();
    connector
        .connect(&args.port)
        .map_err(|err| link_error("connect failed", err))?;
    info!(port = %args.port, "monitoring");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let result = print_frames(&connector, &args, format, &running);
    if connector.is_connected() {
        let _ = connector.disconnect();
    }
    result
}

fn print_frames(
    connector: &Connector,
    args: &MonitorArgs,
    format: OutputFormat,
    running: &AtomicBool,
) -> CliResult<i32> {
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match connector.read(POLL_INTERVAL) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(LinkError::Shutdown) => break,
            Err(err) => return Err(link_error("receive failed", err)),
        };

        if args.radio_only && frame.packet_type != PacketType::RadioErp1 {
            continue;
        }

        print_frame(&frame, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
