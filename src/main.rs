use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::process;

use clap::ArgEnum;
use env_logger;
use log;

use ext_merge_sort::source;
use ext_merge_sort::{ChunkSorter, ExternalSorter, ExternalSorterBuilder, LineFormat};
use ext_merge_sort::{MergeSorter, ParallelSorter, QuickSorter, StdSorter};

struct Settings {
    chunk_size: usize,
    tmp_dir: Option<PathBuf>,
    order: Order,
    output: PathBuf,
}

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let algorithm: Algorithm = arg_parser.value_of_t_or_exit("algorithm");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let settings = Settings {
        chunk_size: arg_parser.value_of_t_or_exit("chunk_size"),
        tmp_dir: arg_parser.value_of("tmp_dir").map(PathBuf::from),
        order: arg_parser.value_of_t_or_exit("sort"),
        output: PathBuf::from(arg_parser.value_of("output").expect("value is required")),
    };

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let records: Box<dyn Iterator<Item = io::Result<String>>> = if arg_parser.is_present("words") {
        Box::new(source::words(input_stream))
    } else {
        Box::new(input_stream.lines())
    };

    match algorithm {
        Algorithm::Merge => sort(MergeSorter, &settings, records),
        Algorithm::Quick => sort(QuickSorter, &settings, records),
        Algorithm::Std => sort(StdSorter, &settings, records),
        Algorithm::Parallel => match ParallelSorter::new(threads) {
            Ok(sorter) => sort(sorter, &settings, records),
            Err(err) => {
                log::error!("thread pool initialization error: {}", err);
                process::exit(1);
            }
        },
    }
}

fn sort<S>(sorter: S, settings: &Settings, records: impl Iterator<Item = io::Result<String>>)
where
    S: ChunkSorter<String>,
{
    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_max_chunk_size(settings.chunk_size)
        .with_sorter(sorter);

    if let Some(tmp_dir) = &settings.tmp_dir {
        sorter_builder = sorter_builder.with_working_dir(tmp_dir);
    }

    let sorter: ExternalSorter<String, LineFormat, S> = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let output: &Path = &settings.output;
    let result = match settings.order {
        Order::Asc => sorter.sort_by(records, output, |a: &String, b: &String| a.cmp(b)),
        Order::Desc => sorter.sort_by(records, output, |a: &String, b: &String| a.cmp(b).reverse()),
    };

    match result {
        Ok(summary) => log::info!(
            "{} records sorted into {} ({} runs, {} merge passes)",
            summary.records,
            output.display(),
            summary.runs,
            summary.passes
        ),
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Algorithm {
    Merge,
    Quick,
    Std,
    Parallel,
}

impl Algorithm {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Algorithm::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Algorithm as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-merge-sort")
        .about("external merge sorter")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("algorithm")
                .short('a')
                .long("algorithm")
                .help("chunk sorting algorithm")
                .takes_value(true)
                .default_value("merge")
                .possible_values(Algorithm::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use by the parallel algorithm")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("maximum number of records sorted in memory at once")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err("Chunk size must be positive".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("words")
                .short('w')
                .long("words")
                .help("sort words instead of lines"),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
