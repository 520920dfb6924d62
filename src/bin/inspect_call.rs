use chrono::Local;
use clap::{Parser, Subcommand};
use groupcall_rust::gccore::start::GroupIdentity;
use groupcall_rust::gccore::{
    GroupCallStartData, HeaderExtensionMap, HeaderExtensions, Mids, ParticipantId,
};
use groupcall_rust::proto::GroupCallStart;
use log::{info, warn};
use prost::Message;
use serde_json::json;

#[derive(Parser)]
#[command(name = "inspect_call")]
#[command(about = "Group call inspection tool")]
#[command(
    long_about = "Prints the MID block of a participant slot, the fallback header extension tables, and validates call-start announcements"
)]
struct Cli {
    #[arg(short, long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// MIDs assigned to a participant slot.
    Mids { participant: u32 },
    /// Header extension IDs used when the SFU announces none.
    HeaderExtensions,
    /// Validates a hex-encoded call-start message and derives its call ID.
    Start {
        message_hex: String,
        #[arg(long)]
        creator: String,
        #[arg(long)]
        group_id_hex: String,
        /// Allowed SFU hostname suffix; repeatable.
        #[arg(long = "allow", required = true)]
        allowed_suffixes: Vec<String>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Mids { participant } => show_mids(participant, cli.json),
        Commands::HeaderExtensions => show_header_extensions(cli.json),
        Commands::Start {
            message_hex,
            creator,
            group_id_hex,
            allowed_suffixes,
        } => show_start(&message_hex, creator, &group_id_hex, &allowed_suffixes, cli.json),
    }
}

fn show_mids(participant: u32, json_output: bool) -> Result<(), anyhow::Error> {
    let mids = Mids::for_participant(ParticipantId(participant))?;
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "participant": participant,
                "microphone": mids.microphone(),
                "camera": mids.camera(),
                "data": mids.data(),
                "all": mids.all(),
            }))?
        );
        return Ok(());
    }
    info!("MIDs for participant {participant}:");
    info!("  microphone: {}", mids.microphone());
    info!("  camera:     {}", mids.camera());
    info!("  data:       {}", mids.data());
    let reserved: Vec<String> = (0..5)
        .filter_map(|index| mids.reserved(index))
        .map(|mid| mid.to_string())
        .collect();
    info!("  reserved:   {}", reserved.join(", "));
    Ok(())
}

fn table(map: &HeaderExtensionMap) -> serde_json::Value {
    map.iter()
        .map(|(id, uri)| json!({ "id": id, "uri": uri }))
        .collect()
}

fn show_header_extensions(json_output: bool) -> Result<(), anyhow::Error> {
    let tables = HeaderExtensions::fallback();
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "microphone": table(&tables.microphone),
                "camera": table(&tables.camera),
            }))?
        );
        return Ok(());
    }
    for (line, map) in [("microphone", &tables.microphone), ("camera", &tables.camera)] {
        info!("Fallback {line} extensions:");
        for (id, uri) in map.iter() {
            info!("  {id:>2} {uri}");
        }
    }
    Ok(())
}

fn show_start(
    message_hex: &str,
    creator: String,
    group_id_hex: &str,
    allowed_suffixes: &[String],
    json_output: bool,
) -> Result<(), anyhow::Error> {
    let bytes = hex::decode(message_hex.trim())
        .map_err(|e| anyhow::anyhow!("call-start message is not hex: {e}"))?;
    let message = GroupCallStart::decode(bytes.as_slice())
        .map_err(|e| anyhow::anyhow!("call-start message does not decode: {e}"))?;
    let group = GroupIdentity {
        creator,
        id: hex::decode(group_id_hex.trim())
            .map_err(|e| anyhow::anyhow!("group id is not hex: {e}"))?,
    };
    let start = match GroupCallStartData::from_wire(&message, allowed_suffixes) {
        Ok(start) => start,
        Err(e) => {
            warn!("Rejected call-start message: {e}");
            return Err(e.into());
        }
    };
    let call_id = start.call_id(&group);
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "call_id": call_id.to_hex(),
                "protocol_version": start.protocol_version,
                "sfu_base_url": start.sfu_base_url.as_str(),
                "sfu_host": start.sfu_base_url.host(),
            }))?
        );
        return Ok(());
    }
    info!("Call-start message is valid");
    info!("  call id:          {}", call_id.to_hex());
    info!("  protocol version: {}", start.protocol_version);
    info!("  SFU base URL:     {}", start.sfu_base_url);
    Ok(())
}
