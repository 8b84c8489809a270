use clap::{CommandFactory, Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tilesearch::harness::{all_positions, DebugDump};
use tilesearch::{
    calibrate, verify_detection, Calibration, ComputeBackend, CpuBackend, DeviceKind,
    DeviceSelector, ErrorKind, HarnessConfig, KernelPaths, KernelSet, RandomPlacement,
    TileGrid, TileSearchError, TimingOrigin,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Tiled parallel marker search with calibrated device timing"
)]
struct Cli {
    /// Image width in cells.
    #[arg(allow_negative_numbers = true)]
    image_width: i64,
    /// Image height in cells.
    #[arg(allow_negative_numbers = true)]
    image_height: i64,
    /// Tile width in cells.
    #[arg(allow_negative_numbers = true)]
    chip_width: i64,
    /// Tile height in cells.
    #[arg(allow_negative_numbers = true)]
    chip_height: i64,
    /// Optional iteration count and/or the word `debug`.
    #[arg(value_name = "NUM_ITERATIONS|debug", num_args = 0..=2, allow_negative_numbers = true)]
    extra: Vec<String>,
    /// Directory holding generate_image.cl and find_image.cl.
    #[arg(long, value_name = "DIR", default_value = "kernels")]
    kernel_dir: PathBuf,
    /// Use the kernel sources compiled into the binary.
    #[arg(long, conflicts_with = "kernel_dir")]
    builtin_kernels: bool,
    /// Compute backend.
    #[arg(long, value_enum, default_value_t = BackendArg::Cpu)]
    backend: BackendArg,
    /// Device class to select.
    #[arg(long, value_enum, default_value_t = DeviceArg::Any)]
    device: DeviceArg,
    /// Index among matching devices.
    #[arg(long, value_name = "N")]
    device_index: Option<usize>,
    /// Worker threads for the CPU device.
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
    /// Seed for marker placement; entropy when omitted.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Barrier timestamp the measurement starts from. `enqueue` measures
    /// marker completion minus barrier enqueue, counting host-side enqueue
    /// time; `release` starts at barrier completion.
    #[arg(long, value_enum, default_value_t = OriginArg::Release)]
    timing_origin: OriginArg,
    /// Check detection at every marker position instead of benchmarking.
    #[arg(long)]
    verify: bool,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Cpu,
    #[cfg(feature = "opencl")]
    Opencl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceArg {
    Any,
    Cpu,
    Gpu,
    Accelerator,
}

impl From<DeviceArg> for DeviceKind {
    fn from(value: DeviceArg) -> Self {
        match value {
            DeviceArg::Any => DeviceKind::Any,
            DeviceArg::Cpu => DeviceKind::Cpu,
            DeviceArg::Gpu => DeviceKind::Gpu,
            DeviceArg::Accelerator => DeviceKind::Accelerator,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OriginArg {
    /// Marker completion minus barrier enqueue; includes host enqueue time.
    Enqueue,
    /// Marker completion minus barrier release; device execution only.
    Release,
}

impl From<OriginArg> for TimingOrigin {
    fn from(value: OriginArg) -> Self {
        match value {
            OriginArg::Enqueue => TimingOrigin::BarrierEnqueue,
            OriginArg::Release => TimingOrigin::BarrierRelease,
        }
    }
}

/// Trailing positionals: an optional iteration count and an optional
/// `debug` switch, in either order.
#[derive(Debug, Default, PartialEq, Eq)]
struct Trailing {
    iterations: Option<usize>,
    debug: bool,
}

fn parse_trailing(extra: &[String]) -> Result<Trailing, TileSearchError> {
    let mut trailing = Trailing::default();
    for token in extra {
        if token.eq_ignore_ascii_case("debug") {
            trailing.debug = true;
            continue;
        }
        let value: i64 = token.parse().map_err(|_| {
            TileSearchError::InvalidArgument(format!("unrecognized argument `{token}`"))
        })?;
        if trailing.iterations.is_some() {
            return Err(TileSearchError::InvalidArgument(format!(
                "iteration count given twice (`{token}`)"
            )));
        }
        let iterations = usize::try_from(value)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(TileSearchError::InvalidIterations)?;
        trailing.iterations = Some(iterations);
    }
    Ok(trailing)
}

fn build_config(cli: &Cli) -> Result<HarnessConfig, TileSearchError> {
    let grid = TileGrid::from_signed(
        cli.image_width,
        cli.image_height,
        cli.chip_width,
        cli.chip_height,
    )?;
    let trailing = parse_trailing(&cli.extra)?;
    let kernels = if cli.builtin_kernels {
        KernelSet::Builtin
    } else {
        KernelSet::Files(KernelPaths::in_dir(&cli.kernel_dir))
    };
    let device = DeviceSelector {
        kind: cli.device.into(),
        index: cli.device_index,
        threads: cli.threads,
    };
    let mut config = HarnessConfig::new(grid)
        .with_debug(trailing.debug)
        .with_kernels(kernels)
        .with_device(device)
        .with_timing_origin(cli.timing_origin.into());
    if let Some(iterations) = trailing.iterations {
        config = config.with_iterations(iterations);
    }
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Serialize)]
struct DebugRecord {
    hits: usize,
    last_marker: [usize; 2],
    output: Vec<Vec<u32>>,
}

impl From<&DebugDump> for DebugRecord {
    fn from(dump: &DebugDump) -> Self {
        Self {
            hits: dump.hit_count(),
            last_marker: [dump.last_marker.x, dump.last_marker.y],
            output: dump
                .output
                .cells()
                .chunks(dump.output.width())
                .map(<[u32]>::to_vec)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    device: String,
    image_width: usize,
    image_height: usize,
    chip_width: usize,
    chip_height: usize,
    output_width: usize,
    output_height: usize,
    iterations: usize,
    timing_origin: &'static str,
    total_ms: f64,
    no_find_ms: f64,
    corrected_ms: f64,
    time_per_find_ms: f64,
    throughput: Option<f64>,
    last_generate_ms: Option<f64>,
    last_search_ms: Option<f64>,
    debug: Option<DebugRecord>,
}

impl Report {
    fn new(config: &HarnessConfig, calibration: &Calibration) -> Self {
        let grid = config.grid;
        Self {
            device: calibration.with_search.device.name.clone(),
            image_width: grid.image_width(),
            image_height: grid.image_height(),
            chip_width: grid.chip_width(),
            chip_height: grid.chip_height(),
            output_width: grid.output_width(),
            output_height: grid.output_height(),
            iterations: calibration.iterations(),
            timing_origin: config.timing_origin.as_str(),
            total_ms: calibration.total_ms(),
            no_find_ms: calibration.no_find_ms(),
            corrected_ms: calibration.corrected_ms(),
            time_per_find_ms: calibration.time_per_find_ms(),
            throughput: calibration.throughput(),
            last_generate_ms: calibration.with_search.last_generate_ms,
            last_search_ms: calibration.with_search.last_search_ms,
            debug: calibration.with_search.debug.as_ref().map(DebugRecord::from),
        }
    }
}

fn print_human(config: &HarnessConfig, calibration: &Calibration) {
    let grid = config.grid;
    println!("device: {}", calibration.with_search.device.name);
    println!(
        "image {}x{}, chip {}x{} -> output {}x{}, {} iterations",
        grid.image_width(),
        grid.image_height(),
        grid.chip_width(),
        grid.chip_height(),
        grid.output_width(),
        grid.output_height(),
        calibration.iterations()
    );
    if let Some(dump) = &calibration.with_search.debug {
        println!("image after last iteration:\n{}", dump.image);
        println!("output grid:\n{}", dump.output);
        println!(
            "last marker at {}, {} tile(s) reported a hit",
            dump.last_marker,
            dump.hit_count()
        );
    }
    println!("total time: {:.4} ms", calibration.total_ms());
    println!("no-find time: {:.4} ms", calibration.no_find_ms());
    println!("search time: {:.4} ms", calibration.corrected_ms());
    println!("time per find: {:.6} ms", calibration.time_per_find_ms());
    match calibration.throughput() {
        Some(rate) => println!("throughput: {rate:.1} finds/s"),
        None => println!("throughput: n/a (search time not positive)"),
    }
    if let Some(ms) = calibration.with_search.last_generate_ms {
        println!("last generate dispatch: {ms:.6} ms");
    }
    if let Some(ms) = calibration.with_search.last_search_ms {
        println!("last search dispatch: {ms:.6} ms");
    }
}

fn run<B: ComputeBackend>(cli: &Cli, config: &HarnessConfig) -> Result<bool, Box<dyn std::error::Error>> {
    if cli.verify {
        let report = verify_detection::<B, _>(config, all_positions(config))?;
        for miss in &report.failures {
            eprintln!(
                "marker {} expected in tile ({}, {}), found {:?}",
                miss.marker, miss.expected.tx, miss.expected.ty, miss.found
            );
        }
        println!(
            "verified {} positions, {} failures",
            report.positions_checked,
            report.failures.len()
        );
        return Ok(report.passed());
    }

    let calibration = match cli.seed {
        Some(seed) => calibrate::<B, _>(config, &mut RandomPlacement::seeded(seed))?,
        None => calibrate::<B, _>(config, &mut RandomPlacement::from_entropy())?,
    };
    if cli.json {
        let report = Report::new(config, &calibration);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(config, &calibration);
    }
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        let filter = match "tilesearch=info".parse() {
            Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
            Err(_) => EnvFilter::from_default_env(),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", Cli::command().render_usage());
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.backend {
        BackendArg::Cpu => run::<CpuBackend>(&cli, &config),
        #[cfg(feature = "opencl")]
        BackendArg::Opencl => run::<tilesearch::OpenClBackend>(&cli, &config),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            match err.downcast_ref::<TileSearchError>() {
                Some(err) if err.kind() == ErrorKind::Compile => {
                    eprintln!("{err}");
                }
                Some(err) => eprintln!("{} error: {err}", err.kind()),
                None => eprintln!("error: {err}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn trailing_accepts_count_and_debug_in_any_order() {
        let parsed = parse_trailing(&strings(&["50", "debug"])).unwrap();
        assert_eq!(parsed, Trailing { iterations: Some(50), debug: true });
        let parsed = parse_trailing(&strings(&["debug", "7"])).unwrap();
        assert_eq!(parsed, Trailing { iterations: Some(7), debug: true });
        assert_eq!(parse_trailing(&[]).unwrap(), Trailing::default());
    }

    #[test]
    fn trailing_rejects_non_positive_and_unknown() {
        assert_eq!(
            parse_trailing(&strings(&["0"])).unwrap_err(),
            TileSearchError::InvalidIterations
        );
        assert_eq!(
            parse_trailing(&strings(&["-4"])).unwrap_err(),
            TileSearchError::InvalidIterations
        );
        assert!(matches!(
            parse_trailing(&strings(&["verbose"])).unwrap_err(),
            TileSearchError::InvalidArgument(_)
        ));
        assert!(parse_trailing(&strings(&["3", "4"])).is_err());
    }

    #[test]
    fn negative_dimension_reaches_validation() {
        let cli = Cli::try_parse_from(["tilesearch", "64", "-3", "8", "8"]).unwrap();
        let err = build_config(&cli).unwrap_err();
        assert_eq!(
            err,
            TileSearchError::InvalidDimension {
                name: "image height",
                value: -3
            }
        );
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "tilesearch",
            "32",
            "16",
            "5",
            "4",
            "10",
            "debug",
            "--builtin-kernels",
            "--device",
            "cpu",
            "--threads",
            "2",
            "--timing-origin",
            "enqueue",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.iterations, 10);
        assert!(config.debug);
        assert_eq!(config.kernels, KernelSet::Builtin);
        assert_eq!(config.device.kind, DeviceKind::Cpu);
        assert_eq!(config.device.threads, Some(2));
        assert_eq!(config.timing_origin, TimingOrigin::BarrierEnqueue);
        assert_eq!(config.grid.output_width(), 7);
        assert_eq!(config.grid.output_height(), 4);
    }

    #[test]
    fn timing_origin_defaults_to_release_and_documents_enqueue() {
        let cli = Cli::try_parse_from(["tilesearch", "8", "8", "4", "4"]).unwrap();
        assert_eq!(cli.timing_origin, OriginArg::Release);

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("marker completion minus barrier enqueue"));
    }

    #[test]
    fn report_carries_last_dispatch_times() {
        let cli = Cli::try_parse_from([
            "tilesearch",
            "8",
            "8",
            "4",
            "4",
            "2",
            "--builtin-kernels",
            "--threads",
            "1",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        let mut placement = RandomPlacement::seeded(3);
        let calibration = calibrate::<CpuBackend, _>(&config, &mut placement).unwrap();

        let json = serde_json::to_value(Report::new(&config, &calibration)).unwrap();
        assert!(json["last_search_ms"].as_f64().unwrap() >= 0.0);
        assert!(json["last_generate_ms"].as_f64().unwrap() >= 0.0);
    }
}
