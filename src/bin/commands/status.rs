use anyhow::Result;
use refdex::lens::utils::{format_rows, OutputFormat};
use refdex::{get_data_source_info, RefdexConfig};
use serde::Serialize;
use tabled::Tabled;

#[derive(Serialize, Tabled)]
struct StatusRow {
    name: String,
    status: String,
    records: String,
    generation: String,
    description: String,
}

pub fn run(config: &RefdexConfig, output_format: OutputFormat) -> Result<()> {
    let sources = get_data_source_info(config);

    if output_format.is_json() {
        let json = match output_format {
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&sources)?,
            OutputFormat::JsonLine => sources
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?
                .join("\n"),
            _ => serde_json::to_string(&sources)?,
        };
        println!("{}", json);
        return Ok(());
    }

    let rows: Vec<StatusRow> = sources
        .into_iter()
        .map(|s| StatusRow {
            name: s.name,
            status: s.status.to_string(),
            records: s
                .record_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            generation: s
                .generation
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string()),
            description: s.description,
        })
        .collect();

    println!("{}", format_rows(&rows, output_format));
    Ok(())
}
