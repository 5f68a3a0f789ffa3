use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use simple_logger::SimpleLogger;

use text_file_merge_sort::sort::Sort;

#[derive(Parser)]
#[command(name = "sort_text_file")]
#[command(about = "Sort the lines of a text file that does not fit in memory")]
#[command(version)]
struct Args {
    #[arg(long = "input-file", help = "Path to the file to sort")]
    input_file: PathBuf,

    #[arg(long = "output-file", help = "Path to write the sorted file to", required_unless_present = "check")]
    output_file: Option<PathBuf>,

    #[arg(long = "n-threads", default_value_t = 0, help = "Level of parallelism, 0 uses all cores")]
    n_threads: usize,

    #[arg(long = "bulk-size", default_value_t = 1_000_000, help = "Number of lines sorted in memory at once")]
    bulk_size: usize,

    #[arg(long = "line-separator", default_value = "\\n", help = "Record separator, accepts \\n, \\r and \\t escapes")]
    line_separator: String,

    #[arg(long = "tmp-dir", help = "Directory for intermediate files, cleared before sorting")]
    tmp_dir: Option<PathBuf>,

    #[arg(long, help = "Only check whether the input is sorted")]
    check: bool,
}

fn unescape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

fn run(args: Args) -> Result<bool, anyhow::Error> {
    let output = args.output_file.unwrap_or_default();
    let mut text_file_sort = Sort::new(args.input_file, output);
    text_file_sort.with_tasks(args.n_threads);
    text_file_sort.with_bulk_size(args.bulk_size);
    text_file_sort.with_line_separator(&unescape(&args.line_separator));
    if let Some(tmp_dir) = args.tmp_dir {
        text_file_sort.with_tmp_dir(tmp_dir);
    }

    if args.check {
        text_file_sort.check()
    } else {
        text_file_sort.sort()?;
        Ok(true)
    }
}

fn init_logging() -> Result<(), log::SetLoggerError> {
    SimpleLogger::new().with_level(log::LevelFilter::Info).init()
}

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }
    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            log::warn!("Input is not sorted");
            ExitCode::from(1)
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{init_logging, unescape};

    #[test]
    fn test_second_logger_init_is_an_error() {
        let _ = init_logging();
        assert!(init_logging().is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\n"), "\n");
        assert_eq!(unescape("\\r\\n"), "\r\n");
        assert_eq!(unescape("||"), "||");
        assert_eq!(unescape("a\\tb\\\\"), "a\tb\\");
        assert_eq!(unescape("\\"), "\\");
    }
}
