use esp3gate::application_registry;
use esp3gate_runtime::{GatewayConfig, RuleSet};

use crate::cmd::CheckArgs;
use crate::exit::{config_error, rule_error, CliResult, SUCCESS};
use crate::output::{print_check, CheckSummary, DeviceEntry, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = GatewayConfig::load(&args.config)
        .map_err(|err| config_error("invalid configuration", err))?;
    config
        .validate_types(&application_registry())
        .map_err(|err| config_error("invalid configuration", err))?;

    let rules_path = config.rules_path(&args.config);
    let rules = RuleSet::load(&rules_path).map_err(|err| rule_error("invalid rules", err))?;

    let names = config
        .name_table()
        .map_err(|err| config_error("invalid configuration", err))?;
    let devices = config
        .device_entries()
        .map(|(address, device_type)| DeviceEntry {
            address: address.to_string(),
            device_type: device_type.to_string(),
            name: names.name_for(address).to_string(),
        })
        .collect();

    let summary = CheckSummary {
        config: args.config.display().to_string(),
        port: config.device.clone(),
        sender_id: config.sender_id.to_string(),
        rules_file: rules_path.display().to_string(),
        rules: rules.len(),
        devices,
    };
    print_check(&summary, format);

    Ok(SUCCESS)
}
