use std::sync::Arc;

use esp3gate::application_registry;
use esp3gate_device::ParameterChange;
use esp3gate_link::{Connector, LinkConfig};
use esp3gate_runtime::{Gateway, GatewayConfig, RuleSet, ShutdownHandle};
use tracing::{debug, info};

use crate::cmd::RunArgs;
use crate::exit::{
    config_error, rule_error, service_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let config = GatewayConfig::load(&args.config)
        .map_err(|err| config_error("invalid configuration", err))?;
    let registry = application_registry();
    config
        .validate_types(&registry)
        .map_err(|err| config_error("invalid configuration", err))?;
    let rules = RuleSet::load(&config.rules_path(&args.config))
        .map_err(|err| rule_error("invalid rules", err))?;

    let connector = Arc::new(Connector::with_config(LinkConfig {
        response_timeout: config.timeouts.response(),
        ..LinkConfig::default()
    }));
    let gateway = Gateway::new(&config, registry, connector, Arc::new(rules))
        .map_err(|err| service_error("gateway setup failed", err))?;

    let _parameter_log = gateway
        .parameters()
        .subscribe_fn("parameter-log", |change: &ParameterChange| {
            debug!(
                device = %change.source.address,
                device_type = change.source.device_type,
                parameter = %change.parameter,
                old = ?change.old,
                new = ?change.new,
                initiation = ?change.initiation,
                "parameter changed"
            );
            Ok(())
        })
        .map_err(|err| CliError::new(INTERNAL, format!("parameter log setup failed: {err}")))?;

    install_ctrlc_handler(gateway.shutdown_handle())?;

    gateway
        .start()
        .map_err(|err| service_error("gateway start failed", err))?;
    info!(port = %config.device, devices = config.device_count(), "gateway running");

    let failed = gateway.run_until_shutdown();
    info!("gateway stopped");
    Ok(if failed.is_empty() { SUCCESS } else { FAILURE })
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.request()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
