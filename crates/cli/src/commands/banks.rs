use bondflow_workflow::normalize;

use super::{block_on, open_session, or_exit, print_json};
use crate::config::ServeConfig;
use crate::OutputFormat;

pub(crate) fn cmd_banks(
    deal_key: &str,
    stage: &str,
    config: &ServeConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let session = open_session(config, output, quiet);
    let stage = normalize(stage);
    let result = block_on(
        async {
            session
                .executor
                .reconcile_banks(deal_key, stage)
                .await
                .map_err(|e| e.to_string())
        },
        output,
        quiet,
    );
    let banks = or_exit(result, output, quiet);

    match output {
        OutputFormat::Text => {
            if banks.is_empty() {
                println!("No banks for {} at {}", deal_key, stage.label());
                return;
            }
            for bank in banks.iter() {
                println!("{}", bank.bank_name);
                if !bank.note.is_empty() {
                    for line in bank.note.lines() {
                        println!("  {}", line);
                    }
                }
                if !bank.reference.is_empty() {
                    println!("  ref: {}", bank.reference);
                }
            }
        }
        OutputFormat::Json => print_json(&banks),
    }
}
