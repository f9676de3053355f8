use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use famlink::demo::StructuredPayload;
use famlink::schema::FamilyRegistry;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What one client exchange produced.
#[derive(Serialize, Debug)]
pub struct ExchangeOutput {
    pub command: &'static str,
    pub family_id: u16,
    pub sequence: u32,
    pub replies: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct PayloadOutput {
    pub pid: u32,
    pub timestamp: u64,
    pub name: String,
    pub ipv4: String,
    pub ipv6: String,
}

impl From<&StructuredPayload> for PayloadOutput {
    fn from(payload: &StructuredPayload) -> Self {
        Self {
            pid: payload.pid,
            timestamp: payload.timestamp,
            name: payload.name().to_owned(),
            ipv4: payload.ipv4.to_string(),
            ipv6: payload.ipv6.to_string(),
        }
    }
}

#[derive(Serialize, Debug)]
struct FamilyOutput<'a> {
    id: u16,
    name: &'a str,
    version: u16,
    commands: Vec<u8>,
    attributes: usize,
}

pub fn print_exchange(out: &ExchangeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "SEQ", "PART", "REPLY"]);
            if out.replies.is_empty() {
                table.add_row(vec![
                    out.command.to_string(),
                    out.sequence.to_string(),
                    "-".to_string(),
                    "(no reply)".to_string(),
                ]);
            }
            for (part, reply) in out.replies.iter().enumerate() {
                table.add_row(vec![
                    out.command.to_string(),
                    out.sequence.to_string(),
                    (part + 1).to_string(),
                    reply.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if out.replies.is_empty() {
                println!("{} seq={} sent", out.command, out.sequence);
            }
            for (part, reply) in out.replies.iter().enumerate() {
                println!("{} seq={} #{}: {reply}", out.command, out.sequence, part + 1);
            }
        }
    }
}

pub fn print_payload(payload: &StructuredPayload, format: OutputFormat) {
    let out = PayloadOutput::from(payload);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PID", "TIMESTAMP", "NAME", "IPV4", "IPV6"]);
            table.add_row(vec![
                out.pid.to_string(),
                out.timestamp.to_string(),
                out.name,
                out.ipv4,
                out.ipv6,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{payload}"),
    }
}

pub fn print_families(registry: &FamilyRegistry, format: OutputFormat) {
    let rows: Vec<FamilyOutput<'_>> = registry
        .families()
        .map(|(id, family)| FamilyOutput {
            id,
            name: family.name(),
            version: family.version(),
            commands: family.commands().iter().copied().collect(),
            attributes: family.policy().len(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ID", "FAMILY", "VERSION", "COMMANDS", "ATTRS"]);
            for row in &rows {
                table.add_row(vec![
                    format!("{:#06x}", row.id),
                    row.name.to_string(),
                    row.version.to_string(),
                    join(&row.commands),
                    row.attributes.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "{:#06x} {} v{} commands=[{}]",
                    row.id,
                    row.name,
                    row.version,
                    join(&row.commands)
                );
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn join(commands: &[u8]) -> String {
    commands
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
