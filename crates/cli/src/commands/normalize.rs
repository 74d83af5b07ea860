use bondflow_workflow::normalize;

use super::print_json;
use crate::OutputFormat;

pub(crate) fn cmd_normalize(raw: &[String], output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            for value in raw {
                let stage = normalize(value);
                println!("{} -> {} ({})", value, stage, stage.label());
            }
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = raw
                .iter()
                .map(|value| {
                    let stage = normalize(value);
                    serde_json::json!({
                        "input": value,
                        "stage": stage,
                        "label": stage.label(),
                    })
                })
                .collect();
            print_json(&rows);
        }
    }
}
