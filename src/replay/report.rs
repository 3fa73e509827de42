//! Output formatting for capture replay

use att_filter_core::{Direction, HexBytes, PassOutcome};
use serde::Serialize;

/// Output format for replay results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Counters gathered over a whole capture
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub packets: u64,
    pub parse_failed: u64,
    /// Packets that are not bulk/interrupt or carry no payload for the filter
    pub skipped: u64,
    pub outbound: u64,
    pub inbound: u64,
    pub bypassed: u64,
    pub unresolved: u64,
    pub no_match: u64,
    pub rewritten: u64,
    pub truncated: u64,
}

impl ReplaySummary {
    pub fn record(&mut self, outcome: &PassOutcome) {
        match outcome {
            PassOutcome::Bypassed => self.bypassed += 1,
            PassOutcome::Unresolved => self.unresolved += 1,
            PassOutcome::NoMatch => self.no_match += 1,
            PassOutcome::Rewritten { truncated_to, .. } => {
                self.rewritten += 1;
                if truncated_to.is_some() {
                    self.truncated += 1;
                }
            }
        }
    }
}

/// One rewritten transfer, as printed
#[derive(Debug, Clone, Serialize)]
pub struct RewriteRecord {
    pub index: u64,
    pub timestamp: f64,
    pub irp_id: u64,
    pub endpoint: u8,
    pub direction: &'static str,
    pub template: &'static str,
    pub length_before: usize,
    pub length_after: usize,
    pub before: String,
    pub after: String,
}

impl RewriteRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u64,
        timestamp: f64,
        irp_id: u64,
        endpoint: u8,
        direction: Direction,
        template: &'static str,
        before: &[u8],
        after: &[u8],
    ) -> Self {
        Self {
            index,
            timestamp,
            irp_id,
            endpoint,
            direction: direction.label(),
            template,
            length_before: before.len(),
            length_after: after.len(),
            before: HexBytes(before).to_string().trim_start().to_string(),
            after: HexBytes(after).to_string().trim_start().to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonLine<'a> {
    Rewrite(&'a RewriteRecord),
    Summary(&'a ReplaySummary),
}

/// Prints replay results to stdout
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print_rewrite(&self, record: &RewriteRecord) {
        match self.format {
            OutputFormat::Text => {
                println!(
                    "{:.6} #{} IRP {:#x} EP{:02x} {:<3} {} len {}->{}",
                    record.timestamp,
                    record.index,
                    record.irp_id,
                    record.endpoint,
                    record.direction,
                    record.template,
                    record.length_before,
                    record.length_after,
                );
                println!("    before: {}", record.before);
                println!("    after:  {}", record.after);
            }
            OutputFormat::Json => print_json(&JsonLine::Rewrite(record)),
        }
    }

    pub fn print_summary(&self, summary: &ReplaySummary) {
        match self.format {
            OutputFormat::Text => {
                eprintln!("\nReplay summary:");
                eprintln!("  Packets:            {}", summary.packets);
                eprintln!("  Parse failed:       {}", summary.parse_failed);
                eprintln!("  Skipped:            {}", summary.skipped);
                eprintln!("  Outbound passes:    {}", summary.outbound);
                eprintln!("  Inbound passes:     {}", summary.inbound);
                eprintln!("  Bypassed:           {}", summary.bypassed);
                eprintln!("  Unresolved:         {}", summary.unresolved);
                eprintln!("  No match:           {}", summary.no_match);
                eprintln!("  Rewritten:          {}", summary.rewritten);
                eprintln!("    Length clamped:   {}", summary.truncated);
            }
            OutputFormat::Json => print_json(&JsonLine::Summary(summary)),
        }
    }
}

fn print_json(line: &JsonLine<'_>) {
    match serde_json::to_string(line) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::warn!("Failed to serialize replay output: {e}"),
    }
}
