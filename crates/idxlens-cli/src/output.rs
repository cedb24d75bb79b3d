use idxlens_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(envelope)?),
    }

    Ok(())
}

fn render_table(envelope: &Envelope<Value>) -> Result<String, CliError> {
    let mut out = String::new();
    let mut line = |text: String| {
        out.push_str(&text);
        out.push('\n');
    };

    line(format!("request_id  : {}", envelope.meta.request_id));
    line(format!("schema      : {}", envelope.meta.schema_version));
    line(format!("generated_at: {}", envelope.meta.generated_at));
    line(format!("source      : {}", envelope.meta.source));
    line(format!("latency_ms  : {}", envelope.meta.latency_ms));
    line(format!("cache_hits  : {}", envelope.meta.cache_hits));

    if !envelope.meta.warnings.is_empty() {
        line(String::from("warnings:"));
        for warning in &envelope.meta.warnings {
            line(format!("  - {warning}"));
        }
    }

    line(String::from("data:"));
    for data_line in serde_json::to_string_pretty(&envelope.data)?.lines() {
        line(format!("  {data_line}"));
    }

    if !envelope.errors.is_empty() {
        line(String::from("errors:"));
        for error in &envelope.errors {
            line(format!("  - {}: {}", error.code, error.message));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idxlens_core::{EnvelopeMeta, SourceId};
    use serde_json::json;

    #[test]
    fn table_lists_warnings_and_data() {
        let meta = EnvelopeMeta::new("request-12345", SourceId::Fixture, 3, 1)
            .expect("valid meta")
            .with_warnings(["600000.SH: missing beta"]);
        let envelope = Envelope::success(meta, json!({ "codes": ["000300.SH"] }));

        let table = render_table(&envelope).expect("renders");
        assert!(table.contains("source      : fixture"));
        assert!(table.contains("  - 600000.SH: missing beta"));
        assert!(table.contains("\"000300.SH\""));
    }
}
