use std::process::ExitCode;

use clap::Parser;
use courier::{Cli, Command, CourierConfig};
use courier_common::{internal, logging};
use courier_delivery::{DeliveryOrchestrator, DeliveryRecorder};
use serde::Serialize;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let CourierConfig {
        relay,
        recorder,
        retry,
    } = CourierConfig::load(cli.config.as_deref())?;
    internal!(
        level = DEBUG,
        relay = %relay.endpoint(),
        configured = relay.is_configured(),
        "Configuration loaded"
    );

    let recorder = recorder.build();

    match cli.command {
        Command::Send(args) => {
            let with_retry = args.retry;
            let request = args.into_request()?;
            let orchestrator = DeliveryOrchestrator::new(relay, recorder);

            let outcome = if with_retry {
                orchestrator.send_report_with_retry(&request, &retry).await
            } else {
                orchestrator.send_report(&request).await
            };

            print_json(&outcome)?;
            Ok(exit_code(outcome.success))
        }
        Command::Probe => {
            let result = DeliveryOrchestrator::new(relay, recorder).probe().await;

            print_json(&result)?;
            Ok(exit_code(result.ok))
        }
        Command::History { limit } => {
            let records = recorder.records().await?;
            let skip = limit.map_or(0, |n| records.len().saturating_sub(n));

            print_json(&records[skip..])?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

const fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
