use std::fs::File as FsFile;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{debug, info};
use ndarray::Array2;
use ndarray_npy::NpzWriter;

use fcs_toolbox::config::AnalysisConfig;
use fcs_toolbox::headers::File;
use fcs_toolbox::tttr_tools::analysis::fcs_analysis;
use fcs_toolbox::tttr_tools::decay::{decay, DecayParams};
use fcs_toolbox::tttr_tools::multitau::CorrelationControl;
use fcs_toolbox::tttr_tools::timetrace::{timetrace, TimeTraceParams};

fn analysis_args<'a, 'b>(cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.arg(
        Arg::with_name("FILE")
            .help("PT3 file to analyse")
            .required(true)
            .index(1),
    )
    .arg(
        Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .help("JSON settings file"),
    )
    .arg(
        Arg::with_name("output")
            .long("output")
            .short("o")
            .takes_value(true)
            .help("Output .npz file, next to the input by default"),
    )
    .arg(
        Arg::with_name("channels")
            .long("channels")
            .takes_value(true)
            .use_delimiter(true)
            .help("Channels to analyse, e.g. 1,2"),
    )
}

fn cli<'a, 'b>() -> App<'a, 'b> {
    App::new("fcs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fluorescence correlation spectroscopy on PicoHarp PT3 files")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("info")
                .about("Print the file header")
                .arg(Arg::with_name("FILE").required(true).index(1)),
        )
        .subcommand(
            analysis_args(SubCommand::with_name("correlate"))
                .about("Auto and cross correlation curves")
                .arg(Arg::with_name("ncasc-start").long("ncasc-start").takes_value(true))
                .arg(Arg::with_name("ncasc-end").long("ncasc-end").takes_value(true))
                .arg(Arg::with_name("nsub").long("nsub").takes_value(true))
                .arg(
                    Arg::with_name("pie")
                        .long("pie")
                        .takes_value(true)
                        .possible_values(&["0", "1", "2"]),
                ),
        )
        .subcommand(
            analysis_args(SubCommand::with_name("trace"))
                .about("Intensity time traces")
                .arg(
                    Arg::with_name("bin")
                        .long("bin")
                        .takes_value(true)
                        .help("Bin width in milliseconds"),
                ),
        )
        .subcommand(
            analysis_args(SubCommand::with_name("decay"))
                .about("Micro-time decay histograms")
                .arg(
                    Arg::with_name("win-int")
                        .long("win-int")
                        .takes_value(true)
                        .help("Bin width in micro-time bins"),
                ),
        )
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid value for --{}: {}", name, value)),
        None => Ok(None),
    }
}

/// Settings file first, command line options on top.
fn load_config(matches: &ArgMatches) -> Result<AnalysisConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Could not load settings from {}", path))?,
        None => AnalysisConfig::default(),
    };
    if let Some(v) = parse_arg(matches, "ncasc-start")? {
        config.ncasc_start = v;
    }
    if let Some(v) = parse_arg(matches, "ncasc-end")? {
        config.ncasc_end = v;
    }
    if let Some(v) = parse_arg(matches, "nsub")? {
        config.nsub = v;
    }
    if let Some(v) = parse_arg(matches, "pie")? {
        config.pie = v;
    }
    if let Some(v) = parse_arg(matches, "bin")? {
        config.photon_count_bin = v;
    }
    if let Some(v) = parse_arg(matches, "win-int")? {
        config.win_int = v;
    }
    if let Some(values) = matches.values_of("channels") {
        config.channels = values
            .map(|v| v.trim().parse::<u8>())
            .collect::<std::result::Result<_, _>>()
            .context("Channels must be integers between 0 and 255")?;
    }
    config.validate()?;
    Ok(config)
}

fn output_path(matches: &ArgMatches, input: &Path, suffix: &str) -> PathBuf {
    match matches.value_of("output") {
        Some(path) => PathBuf::from(path),
        None => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "measurement".to_string());
            input.with_file_name(format!("{}_{}.npz", stem, suffix))
        }
    }
}

/// Stacks equally long columns into a `(rows, columns)` array.
fn columns(cols: &[&[f64]]) -> Array2<f64> {
    let rows = cols.first().map_or(0, |c| c.len());
    Array2::from_shape_fn((rows, cols.len()), |(i, j)| cols[j][i])
}

fn open(matches: &ArgMatches) -> Result<(PathBuf, File)> {
    let path = PathBuf::from(matches.value_of("FILE").unwrap_or_default());
    let file = File::open(path.clone()).with_context(|| format!("Could not open {}", path.display()))?;
    Ok((path, file))
}

fn run_info(matches: &ArgMatches) -> Result<()> {
    let (_, file) = open(matches)?;
    println!("{}", file);
    Ok(())
}

fn run_correlate(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let params = config.fcs_params()?;
    let (path, file) = open(matches)?;
    let photons = file.photons()?;
    info!("{} photons in channels {:?}", photons.len(), photons.channels());

    let start = Instant::now();
    let report: &dyn Fn(usize, usize) = &|done, total| debug!("cascade level {}/{}", done, total);
    let control = CorrelationControl {
        progress: Some(report),
        ..CorrelationControl::default()
    };
    let result = fcs_analysis(&photons, &params, &control)?;
    info!("Correlation done in {:?}", start.elapsed());
    for warning in result.warnings.iter() {
        debug!("{}", warning);
    }

    let out = output_path(matches, &path, "correlation");
    let mut npz = NpzWriter::new(FsFile::create(&out)?);
    for curve in result.curves.iter() {
        npz.add_array(curve.label.as_str(), &columns(&[curve.lags.as_slice(), curve.g.as_slice()]))?;
    }
    npz.finish()?;
    info!("Curves (lag ms, G) written to {}", out.display());
    Ok(())
}

fn run_trace(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let (path, file) = open(matches)?;
    let photons = file.photons()?;

    let out = output_path(matches, &path, "trace");
    let mut npz = NpzWriter::new(FsFile::create(&out)?);
    for &ch in config.channels.iter() {
        let params = TimeTraceParams {
            resolution: config.photon_count_bin,
            channel: Some(ch),
        };
        let trace = timetrace(&photons, &params)?;
        npz.add_array(format!("ch{}", ch), &columns(&[trace.t.as_slice(), trace.rate.as_slice()]))?;
    }
    npz.finish()?;
    info!("Traces (time ms, rate kHz) written to {}", out.display());
    Ok(())
}

fn run_decay(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let (path, file) = open(matches)?;
    let photons = file.photons()?;
    let resolution = file.time_resolution();

    let out = output_path(matches, &path, "decay");
    let mut npz = NpzWriter::new(FsFile::create(&out)?);
    for &ch in config.channels.iter() {
        let params = DecayParams {
            win_int: config.win_int,
            channel: Some(ch),
        };
        let hist = decay(&photons, &params)?;
        let t_ns = hist.t_ns(resolution);
        let counts: Vec<f64> = hist.hist.iter().map(|&c| c as f64).collect();
        npz.add_array(format!("ch{}", ch), &columns(&[t_ns.as_slice(), counts.as_slice()]))?;
    }
    npz.finish()?;
    info!("Decays (time ns, counts) written to {}", out.display());
    Ok(())
}

pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        ("info", Some(sub)) => run_info(sub),
        ("correlate", Some(sub)) => run_correlate(sub),
        ("trace", Some(sub)) => run_trace(sub),
        ("decay", Some(sub)) => run_decay(sub),
        _ => Err(anyhow!("Unknown command")),
    }
}
