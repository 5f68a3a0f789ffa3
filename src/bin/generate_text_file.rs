use std::path::PathBuf;

use clap::Parser;
use simple_logger::SimpleLogger;

use text_file_merge_sort::generator::Generator;

#[derive(Parser)]
#[command(name = "generate_text_file")]
#[command(about = "Generate a text file of random lines")]
#[command(version)]
struct Args {
    #[arg(long = "output-file", help = "Text file to write lines into")]
    output_file: PathBuf,

    #[arg(long = "file-size", help = "Number of lines in the text file")]
    file_size: usize,

    #[arg(long = "max-string-length", help = "Maximal length of a line")]
    max_string_length: usize,

    #[arg(long = "n-threads", default_value_t = 0, help = "Level of parallelism, 0 uses all cores")]
    n_threads: usize,
}

fn main() -> Result<(), anyhow::Error> {
    SimpleLogger::new().with_level(log::LevelFilter::Info).init()?;
    let args = Args::parse();
    let mut generator = Generator::new(args.output_file, args.max_string_length);
    generator.with_tasks(args.n_threads);
    generator.generate(args.file_size)
}
