use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use sockcap::SockcapError;
use sockcap_capture::{
    CaptureError, NetworkCaptureLogger, PcapCaptureLogger, PcapOptions, SocketId, StaticSocket,
    StaticSocketResolver,
};
use sockcap_config::{CaptureConfig, LoggingConfig};
use sockcap_packet::{dissect, SegmentPolicy, Transport};
use sockcap_pcap::{recover_records, PcapRecord, RecordSink};
use thiserror::Error;
use tracing::{debug, info};

mod telemetry;

const SYNTH_SOCKET: SocketId = SocketId(3);

#[derive(Debug, Parser)]
#[command(
    name = "sockcap",
    version,
    about = "Inspect and synthesize sockcap packet-capture traces"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Log filter directive; overrides the config file, RUST_LOG overrides this"
    )]
    pub log_level: Option<String>,
    #[arg(long, global = true, help = "Optional path to sockcap YAML config")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize every record of a capture file.
    Inspect(InspectArgs),
    /// Load a capture config and report the variant it selects.
    Validate(ValidateArgs),
    /// Print the JSON schema of the capture config.
    Schema,
    /// Frame a payload file as synthetic traffic and write a capture file.
    Synth(SynthArgs),
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[arg(long, help = "Capture file path")]
    pub input: PathBuf,
    #[arg(long, help = "Fail on bad checksums or a truncated tail")]
    pub verify: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(long, help = "Config file path")]
    pub input: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthDirection {
    Write,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthTransport {
    Tcp,
    Udp,
}

#[derive(Debug, Args)]
pub struct SynthArgs {
    #[arg(long, help = "Payload file path; defaults to stdin when omitted")]
    pub input: Option<PathBuf>,
    #[arg(long, help = "Capture file to create")]
    pub output: PathBuf,
    #[arg(long, default_value = "10.0.2.15:49152")]
    pub local: SocketAddrV4,
    #[arg(long, default_value = "192.0.2.1:443")]
    pub peer: SocketAddrV4,
    #[arg(long, value_enum, default_value = "write")]
    pub direction: SynthDirection,
    #[arg(long, value_enum, default_value = "tcp")]
    pub transport: SynthTransport,
    #[arg(long, help = "Path MTU; defaults to the config value")]
    pub mtu: Option<usize>,
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_optional_config(cli.config.as_deref())?;
    let logging = config
        .as_ref()
        .map_or_else(LoggingConfig::default, |config| config.logging);
    telemetry::init(logging, cli.log_level.as_deref());

    let mut stdout = io::stdout().lock();
    execute_command(cli.command, config.as_ref(), &mut stdout)
}

fn execute_command(
    command: Command,
    config: Option<&CaptureConfig>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Command::Inspect(args) => run_inspect(&args, out),
        Command::Validate(args) => run_validate(&args, out),
        Command::Schema => run_schema(out),
        Command::Synth(args) => run_synth(&args, config, out),
    }
}

fn run_inspect(args: &InspectArgs, out: &mut dyn Write) -> Result<(), CliError> {
    let file = File::open(&args.input).map_err(|source| CliError::InputRead {
        path: args.input.display().to_string(),
        source,
    })?;
    let report = recover_records(io::BufReader::new(file)).map_err(SockcapError::from)?;
    debug!(records = report.records.len(), "capture file read");

    let mut invalid = 0usize;
    for (index, record) in report.records.iter().enumerate() {
        let (line, valid) = describe_record(record);
        if !valid {
            invalid += 1;
        }
        writeln!(out, "{index:>6} {line}").map_err(|source| CliError::StdoutWrite { source })?;
    }
    writeln!(
        out,
        "{} records, snaplen {}, link type {:?}{}",
        report.records.len(),
        report.header.snaplen,
        report.header.datalink,
        if report.truncated_tail {
            ", truncated tail"
        } else {
            ""
        }
    )
    .map_err(|source| CliError::StdoutWrite { source })?;

    if args.verify {
        if report.truncated_tail {
            return Err(CliError::TruncatedCapture);
        }
        if invalid > 0 {
            return Err(CliError::InvalidFrames { count: invalid });
        }
    }
    Ok(())
}

fn describe_record(record: &PcapRecord) -> (String, bool) {
    let stamp = format!(
        "{}.{:06}",
        record.timestamp.as_secs(),
        record.timestamp.subsec_micros()
    );
    let frame = match dissect(&record.data) {
        Ok(frame) => frame,
        Err(error) => return (format!("{stamp} undecodable: {error}"), false),
    };
    let ip = frame.ipv4;
    let header_ok = ip.header_checksum_valid;

    match frame.transport {
        Transport::Tcp(tcp) => (
            format!(
                "{stamp} TCP {}:{} > {}:{} seq {} ack {} len {}{}",
                ip.source,
                tcp.source_port,
                ip.destination,
                tcp.destination_port,
                tcp.sequence,
                tcp.acknowledgement,
                tcp.payload.len(),
                checksum_note(header_ok && tcp.checksum_valid)
            ),
            header_ok && tcp.checksum_valid,
        ),
        Transport::Udp(udp) => (
            format!(
                "{stamp} UDP {}:{} > {}:{} len {}{}",
                ip.source,
                udp.source_port,
                ip.destination,
                udp.destination_port,
                udp.payload.len(),
                checksum_note(header_ok && udp.checksum_valid)
            ),
            header_ok && udp.checksum_valid,
        ),
        Transport::Fragment(body) => (
            format!(
                "{stamp} IPv4 fragment {} > {} id {} offset {} len {}{}{}",
                ip.source,
                ip.destination,
                ip.identification,
                usize::from(ip.fragment_offset) * 8,
                body.len(),
                if ip.more_fragments { " +MF" } else { "" },
                checksum_note(header_ok)
            ),
            header_ok,
        ),
        Transport::Other { protocol, payload } => (
            format!(
                "{stamp} IPv4 proto {protocol} {} > {} len {}{}",
                ip.source,
                ip.destination,
                payload.len(),
                checksum_note(header_ok)
            ),
            header_ok,
        ),
    }
}

const fn checksum_note(valid: bool) -> &'static str {
    if valid {
        ""
    } else {
        " [bad checksum]"
    }
}

fn run_validate(args: &ValidateArgs, out: &mut dyn Write) -> Result<(), CliError> {
    let config = CaptureConfig::load(&args.input).map_err(SockcapError::from)?;
    let resolved = config.resolve().map_err(SockcapError::from)?;
    writeln!(
        out,
        "capture: {}, mtu {}, mss {}",
        resolved.capture_type,
        resolved.policy.mtu(),
        resolved.policy.max_segment_size()
    )
    .map_err(|source| CliError::StdoutWrite { source })
}

fn run_schema(out: &mut dyn Write) -> Result<(), CliError> {
    let schema = serde_json::to_string_pretty(&sockcap_config::json_schema())
        .map_err(|source| CliError::SchemaRender { source })?;
    writeln!(out, "{schema}").map_err(|source| CliError::StdoutWrite { source })
}

fn run_synth(
    args: &SynthArgs,
    config: Option<&CaptureConfig>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let payload = read_input_bytes(args.input.as_deref())?;
    let mtu = args
        .mtu
        .or_else(|| config.map(|config| config.mtu))
        .unwrap_or(SegmentPolicy::DEFAULT_MTU);
    let policy = SegmentPolicy::new(mtu).map_err(SockcapError::from)?;

    let file = File::create(&args.output).map_err(|source| {
        SockcapError::from(CaptureError::OpenSink {
            path: args.output.clone(),
            source,
        })
    })?;
    let frames = synthesize(file, args, policy, &payload)?;

    info!(frames, output = %args.output.display(), "synthetic capture written");
    writeln!(
        out,
        "wrote {frames} frames for {} payload bytes to {}",
        payload.len(),
        args.output.display()
    )
    .map_err(|source| CliError::StdoutWrite { source })
}

/// Frames `payload` into `sink` as one logged read or write. A write failure
/// part way through is an error even though the logger itself swallows it.
fn synthesize<W: RecordSink + Send>(
    sink: W,
    args: &SynthArgs,
    policy: SegmentPolicy,
    payload: &[u8],
) -> Result<u64, CliError> {
    let local = SocketAddr::V4(args.local);
    let peer = SocketAddr::V4(args.peer);
    let entry = match args.transport {
        SynthTransport::Tcp => StaticSocket::stream(local, peer),
        SynthTransport::Udp => StaticSocket::datagram(local, Some(peer)),
    };
    let resolver = StaticSocketResolver::new().with_socket(SYNTH_SOCKET, entry);
    let options = PcapOptions {
        policy,
        ..PcapOptions::default()
    };

    let logger = PcapCaptureLogger::new(sink, resolver, options).map_err(SockcapError::from)?;
    match args.direction {
        SynthDirection::Write => logger.log_write(payload, SYNTH_SOCKET, None),
        SynthDirection::Read => logger.log_read(payload, SYNTH_SOCKET, None),
    }
    let frames = logger.frames_written();
    match logger.finish().map_err(SockcapError::from)? {
        Some(_) => Ok(frames),
        None => Err(CliError::CaptureIncomplete { frames }),
    }
}

fn load_optional_config(path: Option<&Path>) -> Result<Option<CaptureConfig>, CliError> {
    path.map(|path| {
        CaptureConfig::load(path).map_err(|error| CliError::Facade(SockcapError::from(error)))
    })
    .transpose()
}

fn read_input_bytes(input: Option<&Path>) -> Result<Vec<u8>, CliError> {
    match input {
        Some(path) => fs::read(path).map_err(|source| CliError::InputRead {
            path: path.display().to_string(),
            source,
        }),
        None => {
            let mut payload = Vec::new();
            io::stdin()
                .read_to_end(&mut payload)
                .map_err(|source| CliError::StdinRead { source })?;
            Ok(payload)
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Facade(#[from] SockcapError),

    #[error("failed to read input file `{path}`: {source}")]
    InputRead { path: String, source: io::Error },

    #[error("failed to read stdin: {source}")]
    StdinRead { source: io::Error },

    #[error("failed to write stdout: {source}")]
    StdoutWrite { source: io::Error },

    #[error("failed to render schema: {source}")]
    SchemaRender { source: serde_json::Error },

    #[error("capture file ends inside a record")]
    TruncatedCapture,

    #[error("{count} frames failed checksum or decoding checks")]
    InvalidFrames { count: usize },

    #[error("capture stopped after {frames} frames: the output could not be written")]
    CaptureIncomplete { frames: u64 },
}

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::TruncatedCapture | Self::InvalidFrames { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{self, Write};
    use std::path::PathBuf;

    use clap::Parser;
    use sockcap_packet::SegmentPolicy;
    use sockcap_pcap::RecordSink;

    use super::{
        execute_command, synthesize, Cli, CliError, Command, InspectArgs, SynthArgs,
        SynthDirection, SynthTransport, ValidateArgs,
    };

    fn synth_args(input: PathBuf, output: PathBuf, transport: SynthTransport) -> SynthArgs {
        SynthArgs {
            input: Some(input),
            output,
            local: "10.0.2.15:49152".parse().expect("local"),
            peer: "192.0.2.1:443".parse().expect("peer"),
            direction: SynthDirection::Write,
            transport,
            mtu: None,
        }
    }

    #[test]
    fn entrypoint_commands_parse() {
        assert!(Cli::try_parse_from(["sockcap", "schema"]).is_ok());
        assert!(Cli::try_parse_from(["sockcap", "inspect", "--input", "a.pcap"]).is_ok());
        assert!(Cli::try_parse_from(["sockcap", "validate", "--input", "c.yaml"]).is_ok());
        assert!(Cli::try_parse_from([
            "sockcap",
            "--log-level",
            "debug",
            "synth",
            "--output",
            "out.pcap",
            "--transport",
            "udp",
            "--direction",
            "read",
        ])
        .is_ok());
        assert!(Cli::try_parse_from(["sockcap", "synth"]).is_err());
    }

    #[test]
    fn synth_then_inspect_verifies_clean_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("payload.bin");
        let output = dir.path().join("trace.pcap");
        fs::write(&input, vec![0x61u8; 3000]).expect("payload");

        let mut out = Vec::new();
        execute_command(
            Command::Synth(synth_args(input, output.clone(), SynthTransport::Tcp)),
            None,
            &mut out,
        )
        .expect("synth");
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.starts_with("wrote 3 frames for 3000 payload bytes"), "{text}");

        let mut out = Vec::new();
        execute_command(
            Command::Inspect(InspectArgs {
                input: output,
                verify: true,
            }),
            None,
            &mut out,
        )
        .expect("inspect");
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("TCP 10.0.2.15:49152 > 192.0.2.1:443 seq 1460 ack 0 len 1460"));
        assert!(text.contains("3 records, snaplen 65535, link type ETHERNET"));
        assert!(!text.contains("bad checksum"));
    }

    #[test]
    fn inspect_verify_rejects_truncated_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("payload.bin");
        let output = dir.path().join("trace.pcap");
        fs::write(&input, b"datagram payload").expect("payload");

        execute_command(
            Command::Synth(synth_args(input, output.clone(), SynthTransport::Udp)),
            None,
            &mut std::io::sink(),
        )
        .expect("synth");
        let mut bytes = fs::read(&output).expect("read");
        bytes.truncate(bytes.len() - 3);
        fs::write(&output, bytes).expect("rewrite");

        let error = execute_command(
            Command::Inspect(InspectArgs {
                input: output,
                verify: true,
            }),
            None,
            &mut std::io::sink(),
        )
        .expect_err("truncated capture should fail verification");
        assert!(matches!(error, CliError::TruncatedCapture));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn validate_reports_resolved_variant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.yaml");
        fs::write(&path, "dump_as_pcap: true\nmtu: 9000\n").expect("config");

        let mut out = Vec::new();
        execute_command(
            Command::Validate(ValidateArgs { input: path }),
            None,
            &mut out,
        )
        .expect("validate");
        assert_eq!(
            String::from_utf8(out).expect("utf-8"),
            "capture: pcap, mtu 9000, mss 8960\n"
        );
    }

    #[test]
    fn validate_surfaces_configuration_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.yaml");
        fs::write(&path, "mode: raw\n").expect("config");

        let error = execute_command(
            Command::Validate(ValidateArgs { input: path }),
            None,
            &mut std::io::sink(),
        )
        .expect_err("raw without toggles");
        assert!(matches!(error, CliError::Facade(_)));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn schema_is_valid_json() {
        let mut out = Vec::new();
        execute_command(Command::Schema, None, &mut out).expect("schema");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert!(value.get("properties").is_some());
    }

    /// Takes the global header and `records` records, then reports a full disk.
    struct FillingSink {
        bytes: Vec<u8>,
        writes_left: usize,
    }

    impl Write for FillingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            self.writes_left -= 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RecordSink for FillingSink {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.bytes.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn synth_fails_when_output_fills_up_mid_payload() {
        let args = synth_args(
            PathBuf::from("unused.bin"),
            PathBuf::from("unused.pcap"),
            SynthTransport::Tcp,
        );
        let sink = FillingSink {
            bytes: Vec::new(),
            writes_left: 2,
        };

        let error = synthesize(sink, &args, SegmentPolicy::default(), &[0x62; 3000])
            .expect_err("second segment cannot be written");
        assert!(matches!(error, CliError::CaptureIncomplete { frames: 1 }));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn synth_counts_every_frame_on_a_healthy_sink() {
        let args = synth_args(
            PathBuf::from("unused.bin"),
            PathBuf::from("unused.pcap"),
            SynthTransport::Udp,
        );
        let frames = synthesize(Vec::new(), &args, SegmentPolicy::default(), &[0x63; 3000])
            .expect("synthesize");
        assert_eq!(frames, 3);
    }
}
